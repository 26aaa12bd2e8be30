//! Continuous energy loss of protons and ions in the Bragg-Kleeman approximation.
//!
//! The water CSDA range of a proton follows `R = α·T^p`; ions are scaled by
//! mass number `A` and charge `z` as `R_ion(T) = (A/z²)·R_p(T/A)`. Other media
//! enter through their stopping power relative to water.

use super::{Medium, StepContext, Track};

const ALPHA_CM_PER_MEV: f64 = 0.0022;
const EXPONENT: f64 = 1.77;
/// Largest fraction of the residual range consumed by a single step.
const MAX_RANGE_FRACTION: f64 = 0.2;
pub const MIN_STEP_CM: f64 = 1e-3;

fn scaling(track: &Track) -> Option<(f64, f64)> {
    let z = track.particle.charge() as f64;
    let a = track.particle.mass_number() as f64;
    if z == 0.0 || a == 0.0 {
        None
    } else {
        Some((a, z * z))
    }
}

/// Water-equivalent CSDA range in cm.
pub fn csda_range_water(track: &Track, energy: f64) -> f64 {
    match scaling(track) {
        Some((a, z2)) if energy > 0.0 => a / z2 * ALPHA_CM_PER_MEV * (energy / a).powf(EXPONENT),
        Some(_) => 0.0,
        None => f64::INFINITY,
    }
}

/// Kinetic energy with the given water-equivalent residual range.
pub fn energy_from_range_water(track: &Track, range: f64) -> f64 {
    match scaling(track) {
        Some((a, z2)) if range > 0.0 => a * (range * z2 / a / ALPHA_CM_PER_MEV).powf(1.0 / EXPONENT),
        _ => 0.0,
    }
}

pub(super) fn step_limit(track: &Track, medium: &Medium, max_step: f64) -> f64 {
    if medium.relative_stopping_power <= 0.0 {
        return f64::INFINITY;
    }
    let range = csda_range_water(track, track.energy) / medium.relative_stopping_power;
    (MAX_RANGE_FRACTION * range).max(MIN_STEP_CM).min(max_step)
}

pub(super) fn apply(track: &mut Track, ctx: &mut StepContext<'_>) {
    let rsp = ctx.medium.relative_stopping_power;
    if rsp <= 0.0 || track.energy <= 0.0 {
        return;
    }
    let residual = csda_range_water(track, track.energy) - ctx.length * rsp;
    let remaining = if residual > 0.0 {
        energy_from_range_water(track, residual)
    } else {
        0.0
    };
    let loss = (track.energy - remaining).max(0.0);
    track.energy = remaining;
    ctx.continuous_loss += loss;
    ctx.deposit += loss;
}
