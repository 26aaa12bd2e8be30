//! Multiple Coulomb scattering with the Highland width and Gaussian projected angles.

use super::{StepContext, Track};
use crate::core::utils::geometry::deflect;
use crate::engine::utils::sampling::gaussian;

const HIGHLAND_MEV: f64 = 13.6;
const HIGHLAND_LOG_COEFF: f64 = 0.038;

/// Width (rad) of the projected angular distribution after `length` cm.
pub fn highland_theta0(track: &Track, energy: f64, length: f64, radiation_length: f64) -> f64 {
    let z = track.particle.charge().abs() as f64;
    if z == 0.0 || energy <= 0.0 || length <= 0.0 || !radiation_length.is_finite() {
        return 0.0;
    }
    let mass = track.particle.mass();
    let pc_squared = energy * (energy + 2.0 * mass);
    let total = energy + mass;
    let beta_squared = pc_squared / (total * total);
    let beta_pc = pc_squared / total;
    let x = length / radiation_length;
    let correction = (1.0 + HIGHLAND_LOG_COEFF * (x * z * z / beta_squared).ln()).max(0.0);
    HIGHLAND_MEV / beta_pc * z * x.sqrt() * correction
}

pub(super) fn apply(track: &mut Track, ctx: &mut StepContext<'_>) {
    let mid_energy = 0.5 * (ctx.pre_energy + track.energy);
    let theta0 = highland_theta0(track, mid_energy, ctx.length, ctx.medium.radiation_length);
    if theta0 <= 0.0 {
        return;
    }
    let tx = gaussian(ctx.rng, theta0);
    let ty = gaussian(ctx.rng, theta0);
    let theta = (tx * tx + ty * ty).sqrt();
    let phi = ty.atan2(tx);
    track.direction = deflect(&track.direction, theta, phi);
}
