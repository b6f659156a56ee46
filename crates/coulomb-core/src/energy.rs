// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Energy Reducer
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Global energy reduction: kinetic plus one of two potential modes.
//!
//! `Exact` gathers every rank's positions and charges, splits the O(N²)
//! pair sum by row range, and is the ground truth for drift checks.
//! `GaussLaw` is the O(N) shell-theorem accumulation over the sorted
//! arrangement; it equals the exact sum only in the spherically symmetric
//! no-shell-crossing limit and is meant for production-scale runs.

use crate::cloud::{contiguous, ParticleCloud};
use crate::comm::Communicator;
use coulomb_types::constants::RADIUS_GUARD;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyMethod {
    /// O(N²) pair sum distributed over ranks; needs 4·N·8 bytes per rank.
    Exact,
    /// O(N) Gauss-law accumulation; requires the post-sort arrangement.
    GaussLaw,
}

/// Global total energy. Collective: every rank must call this.
pub fn total_energy<C: Communicator>(
    cloud: &ParticleCloud,
    method: EnergyMethod,
    comm: &C,
) -> f64 {
    let kinetic = kinetic_energy(cloud, comm);
    let potential = match method {
        EnergyMethod::Exact => potential_exact(cloud, comm),
        EnergyMethod::GaussLaw => potential_gauss_law(cloud, comm),
    };
    kinetic + potential
}

/// Sum-reduced kinetic energy Σ ½·|iqom·q|·v². The particle mass is
/// |iqom·q| since iqom = m/q.
pub fn kinetic_energy<C: Communicator>(cloud: &ParticleCloud, comm: &C) -> f64 {
    let mut local = 0.0;
    for i in 0..cloud.len() {
        let v2 = cloud.vx[i] * cloud.vx[i] + cloud.vy[i] * cloud.vy[i] + cloud.vz[i] * cloud.vz[i];
        local += 0.5 * (cloud.iqom * cloud.q[i]).abs() * v2;
    }
    comm.all_reduce_sum(local)
}

/// Exact O(N²) potential: gather counts, gather data, then each rank sums
/// the pair rows of its own slice. The ½ compensates double counting.
pub fn potential_exact<C: Communicator>(cloud: &ParticleCloud, comm: &C) -> f64 {
    let counts = comm.all_gather(cloud.len());
    let all_x = comm.all_gather_v(contiguous(&cloud.x));
    let all_y = comm.all_gather_v(contiguous(&cloud.y));
    let all_z = comm.all_gather_v(contiguous(&cloud.z));
    let all_q = comm.all_gather_v(contiguous(&cloud.q));

    let total: usize = counts.iter().sum();
    let my_start: usize = counts[..comm.rank()].iter().sum();
    let my_end = my_start + counts[comm.rank()];

    let local: f64 = (my_start..my_end)
        .into_par_iter()
        .map(|i| {
            let mut acc = 0.0;
            for j in 0..total {
                if i == j {
                    continue;
                }
                let dx = all_x[i] - all_x[j];
                let dy = all_y[i] - all_y[j];
                let dz = all_z[i] - all_z[j];
                let rij = (dx * dx + dy * dy + dz * dz).sqrt();
                if rij > RADIUS_GUARD {
                    acc += 0.5 * all_q[i] * all_q[j] / rij;
                }
            }
            acc
        })
        .sum();

    comm.all_reduce_sum(local)
}

/// O(N) Gauss-law potential over the sorted arrangement: each particle
/// interacts with the charge strictly inside its shell.
pub fn potential_gauss_law<C: Communicator>(cloud: &ParticleCloud, comm: &C) -> f64 {
    let local_charge = cloud.total_charge_local();
    let mut q_inner = comm.exclusive_scan_sum(local_charge);

    let mut local = 0.0;
    for i in 0..cloud.len() {
        let r = cloud.r2[i].sqrt();
        if r > RADIUS_GUARD {
            local += cloud.q[i] * q_inner / r;
        }
        q_inner += cloud.q[i];
    }
    comm.all_reduce_sum(local)
}
