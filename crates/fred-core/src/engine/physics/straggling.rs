//! Energy-loss straggling with the Bohr variance.

use super::{StepContext, Track};
use crate::engine::utils::sampling::gaussian;

/// 4π·N_A·r_e²·(m_e c²)² in MeV² cm²/g.
const BOHR_CONSTANT: f64 = 0.1569;

/// Standard deviation (MeV) of the energy lost over `length` cm.
pub fn bohr_sigma(charge: i32, density: f64, z_over_a: f64, length: f64) -> f64 {
    let z = charge as f64;
    (BOHR_CONSTANT * density * z_over_a * z * z * length).max(0.0).sqrt()
}

pub(super) fn apply(track: &mut Track, ctx: &mut StepContext<'_>) {
    if track.energy <= 0.0 || ctx.continuous_loss <= 0.0 {
        return;
    }
    let sigma = bohr_sigma(
        track.particle.charge(),
        ctx.medium.density,
        ctx.medium.z_over_a,
        ctx.length,
    );
    let fluctuated = (ctx.continuous_loss + gaussian(ctx.rng, sigma)).clamp(0.0, ctx.pre_energy);
    let delta = fluctuated - ctx.continuous_loss;
    track.energy = (track.energy - delta).max(0.0);
    ctx.deposit += delta;
    ctx.continuous_loss = fluctuated;
}
