// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Number of uniform r² bins used for splitter selection in the parallel sort.
pub const HISTOGRAM_BINS: usize = 1024;

/// Doubles per packed particle record: x, y, z, vx, vy, vz, q, e_r, r².
pub const PARTICLE_RECORD_LEN: usize = 9;

/// Below this r², a particle sits at the origin and sees no radial field.
pub const R2_ORIGIN_FLOOR: f64 = 1e-30;

/// Radius guard for the velocity kick and for pair distances in the exact
/// potential sum.
pub const RADIUS_GUARD: f64 = 1e-15;

/// If the global r² span is narrower than this, all particles share one
/// radius and the histogram range is widened by 1 before binning.
pub const DEGENERATE_SPAN: f64 = 1e-15;

/// Base RNG seed; rank r draws from `SEED_BASE + r * SEED_RANK_STRIDE`.
pub const SEED_BASE: u64 = 10;
pub const SEED_RANK_STRIDE: u64 = 12345;

/// Input-file defaults when the optional keys are absent.
pub const DEFAULT_SAVE_INTERVAL: usize = 100;
pub const DEFAULT_MAX_SPECIES: usize = 10;
pub const DEFAULT_BUFFER_SIZE: usize = 32768;
