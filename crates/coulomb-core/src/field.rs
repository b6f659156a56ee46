// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Radial Field
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Distributed prefix field: E_r[i] = Q_enc(i) / r²[i].
//!
//! Requires the post-sort arrangement — each rank holds a contiguous
//! radial shell, locally sorted — so the enclosed charge of particle i is
//! the exclusive scan over ranks plus the local running sum up to i.

use crate::cloud::ParticleCloud;
use crate::comm::Communicator;
use coulomb_types::constants::R2_ORIGIN_FLOOR;

pub fn update_radial_field<C: Communicator>(cloud: &mut ParticleCloud, comm: &C) {
    let local_sum = cloud.total_charge_local();
    let prefix = comm.exclusive_scan_sum(local_sum);

    let mut enclosed = prefix;
    for i in 0..cloud.len() {
        enclosed += cloud.q[i];
        cloud.e_r[i] = if cloud.r2[i] > R2_ORIGIN_FLOOR {
            enclosed / cloud.r2[i]
        } else {
            // Particle at the origin sees no radial field.
            0.0
        };
    }
}
