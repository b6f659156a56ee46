// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Particle Cloud
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Structure-of-arrays particle storage for one species on one rank.

use coulomb_types::constants::SEED_RANK_STRIDE;
use ndarray::{s, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One species' local particles as nine parallel arrays.
///
/// All arrays have identical length at every observable point; the sort,
/// field and integrator phases are responsible for keeping the radial
/// ordering invariants — nothing is enforced here.
#[derive(Debug, Clone)]
pub struct ParticleCloud {
    /// Species tag, used in output file names.
    pub name: String,
    /// Mass/charge ratio; the integrator uses qom = 1/iqom.
    pub iqom: f64,
    /// Global particle count for this species, fixed for the run.
    pub n_global: u64,

    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub z: Array1<f64>,
    pub vx: Array1<f64>,
    pub vy: Array1<f64>,
    pub vz: Array1<f64>,
    /// Per-particle charge.
    pub q: Array1<f64>,
    /// Cached radial field, valid after the field phase.
    pub e_r: Array1<f64>,
    /// Cached squared radius, recomputed by the sort.
    pub r2: Array1<f64>,
}

impl ParticleCloud {
    pub fn new(name: &str, iqom: f64, n_local: usize, n_global: u64) -> Self {
        ParticleCloud {
            name: name.to_string(),
            iqom,
            n_global,
            x: Array1::zeros(n_local),
            y: Array1::zeros(n_local),
            z: Array1::zeros(n_local),
            vx: Array1::zeros(n_local),
            vy: Array1::zeros(n_local),
            vz: Array1::zeros(n_local),
            q: Array1::zeros(n_local),
            e_r: Array1::zeros(n_local),
            r2: Array1::zeros(n_local),
        }
    }

    /// Local particle count on this rank.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn qom(&self) -> f64 {
        1.0 / self.iqom
    }

    /// Adjust all nine arrays to length `n`, preserving the common prefix.
    pub fn resize(&mut self, n: usize) {
        for field in self.fields_mut() {
            resize_field(field, n);
        }
    }

    /// Fill the r² cache from the current positions.
    pub fn compute_r2(&mut self) {
        for i in 0..self.len() {
            self.r2[i] = self.x[i] * self.x[i] + self.y[i] * self.y[i] + self.z[i] * self.z[i];
        }
    }

    /// Largest cached r² on this rank; 0 when the rank holds no particles.
    pub fn max_r2_local(&self) -> f64 {
        self.r2.iter().copied().fold(0.0, f64::max)
    }

    /// Sum of local charges. Not conserved per rank across sorts — only
    /// the global sum is.
    pub fn total_charge_local(&self) -> f64 {
        self.q.sum()
    }

    pub(crate) fn fields_mut(&mut self) -> [&mut Array1<f64>; 9] {
        [
            &mut self.x,
            &mut self.y,
            &mut self.z,
            &mut self.vx,
            &mut self.vy,
            &mut self.vz,
            &mut self.q,
            &mut self.e_r,
            &mut self.r2,
        ]
    }

    /// Rejection-sample `n_local` particles uniformly inside the sphere of
    /// radius `radius`, each carrying `charge`, at rest. Each rank calls
    /// this with its own seed, so local ensembles are distinct.
    pub fn sample_sphere(
        name: &str,
        iqom: f64,
        n_local: usize,
        n_global: u64,
        radius: f64,
        charge: f64,
        seed: u64,
    ) -> Self {
        assert!(radius > 0.0, "sphere radius must be > 0");
        let mut cloud = ParticleCloud::new(name, iqom, n_local, n_global);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut accepted = 0;
        while accepted < n_local {
            let (x, y, z, r2) = draw_in_cube(&mut rng, radius);
            if r2 <= radius * radius {
                cloud.x[accepted] = x;
                cloud.y[accepted] = y;
                cloud.z[accepted] = z;
                cloud.q[accepted] = charge;
                cloud.r2[accepted] = r2;
                accepted += 1;
            }
        }
        cloud
    }

    /// Sample this rank's contiguous slice of a single seeded rejection
    /// stream of `n_global` particles. Every P produces the identical
    /// global ensemble, which is what the P-invariance checks need; the
    /// production path uses [`ParticleCloud::sample_sphere`] instead.
    pub fn sample_sphere_slice(
        name: &str,
        iqom: f64,
        n_global: u64,
        radius: f64,
        charge: f64,
        seed: u64,
        rank: usize,
        nranks: usize,
    ) -> Self {
        assert!(radius > 0.0, "sphere radius must be > 0");
        let (start, count) = local_range(n_global, rank, nranks);
        let mut cloud = ParticleCloud::new(name, iqom, count as usize, n_global);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut produced: u64 = 0;
        let end = start + count;
        while produced < end {
            let (x, y, z, r2) = draw_in_cube(&mut rng, radius);
            if r2 <= radius * radius {
                if produced >= start {
                    let i = (produced - start) as usize;
                    cloud.x[i] = x;
                    cloud.y[i] = y;
                    cloud.z[i] = z;
                    cloud.q[i] = charge;
                    cloud.r2[i] = r2;
                }
                produced += 1;
            }
        }
        cloud
    }
}

/// View a field as a standard slice; SoA fields are always contiguous.
pub(crate) fn contiguous(field: &Array1<f64>) -> &[f64] {
    field
        .as_slice()
        .expect("SoA fields are standard-layout and contiguous")
}

fn draw_in_cube(rng: &mut StdRng, radius: f64) -> (f64, f64, f64, f64) {
    let x = rng.gen_range(-radius..radius);
    let y = rng.gen_range(-radius..radius);
    let z = rng.gen_range(-radius..radius);
    (x, y, z, x * x + y * y + z * z)
}

fn resize_field(arr: &mut Array1<f64>, n: usize) {
    if arr.len() == n {
        return;
    }
    let keep = arr.len().min(n);
    let mut next = Array1::zeros(n);
    next.slice_mut(s![..keep]).assign(&arr.slice(s![..keep]));
    *arr = next;
}

/// Seed for `rank`, offset so every rank samples a distinct stream.
pub fn seed_for_rank(base: u64, rank: usize) -> u64 {
    base + rank as u64 * SEED_RANK_STRIDE
}

/// Even initial split of `n_global` particles over `nranks`, remainder
/// going to the lowest ranks. Returns this rank's count.
pub fn local_share(n_global: u64, rank: usize, nranks: usize) -> u64 {
    local_range(n_global, rank, nranks).1
}

/// (start, count) of this rank's slice in the even initial split.
pub fn local_range(n_global: u64, rank: usize, nranks: usize) -> (u64, u64) {
    let p = nranks as u64;
    let r = rank as u64;
    let base = n_global / p;
    let rem = n_global % p;
    let start = r * base + r.min(rem);
    let count = base + u64::from(r < rem);
    (start, count)
}
