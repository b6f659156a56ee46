//! Explicit Euler integrator over the local shell. Pure local phase.

use crate::cloud::ParticleCloud;
use coulomb_types::constants::RADIUS_GUARD;

/// One Euler step: radial velocity kick from the cached field, then drift.
///
/// The kick direction is r⃗/r, so particles closer than `RADIUS_GUARD` to
/// the origin keep their velocity and only drift.
pub fn push_euler(cloud: &mut ParticleCloud, dt: f64) {
    let qom = cloud.qom();
    for i in 0..cloud.len() {
        let r = cloud.r2[i].sqrt();
        if r > RADIUS_GUARD {
            let kick = dt * qom * cloud.e_r[i] / r;
            cloud.vx[i] += kick * cloud.x[i];
            cloud.vy[i] += kick * cloud.y[i];
            cloud.vz[i] += kick * cloud.z[i];
        }
        cloud.x[i] += dt * cloud.vx[i];
        cloud.y[i] += dt * cloud.vy[i];
        cloud.z[i] += dt * cloud.vz[i];
    }
}
