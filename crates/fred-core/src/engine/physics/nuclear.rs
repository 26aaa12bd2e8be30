//! Nuclear elastic and non-elastic interactions with constant macroscopic
//! cross sections scaled by density and projectile size.

use super::{Medium, NuclearChannel, StepContext, Track};
use crate::core::models::particle::Particle;
use crate::core::utils::geometry::deflect;
use crate::engine::utils::sampling::{azimuth, exponential};

/// Proton non-elastic macroscopic cross section in water (cm⁻¹).
const SIGMA_INELASTIC_WATER: f64 = 0.0116;
/// Proton elastic macroscopic cross section in water (cm⁻¹).
const SIGMA_ELASTIC_WATER: f64 = 0.0040;

const ELASTIC_MEAN_ANGLE: f64 = 0.02;
const ELASTIC_RECOIL_FRACTION: f64 = 0.02;
const INELASTIC_LOCAL_FRACTION: f64 = 0.3;
const INELASTIC_SECONDARY_FRACTION: f64 = 0.4;
const INELASTIC_SECONDARY_MEAN_ANGLE: f64 = 0.15;

/// Elastic and non-elastic macroscopic cross sections (cm⁻¹) for the track.
pub fn cross_sections(track: &Track, medium: &Medium, threshold: f64) -> (f64, f64) {
    let a = track.particle.mass_number() as f64;
    if track.particle.charge() <= 0 || a == 0.0 || track.energy < threshold {
        return (0.0, 0.0);
    }
    let size = a.powf(2.0 / 3.0);
    (
        SIGMA_ELASTIC_WATER * medium.density * size,
        SIGMA_INELASTIC_WATER * medium.density * size,
    )
}

pub(super) fn apply_elastic(track: &mut Track, ctx: &mut StepContext<'_>) {
    if ctx.channel != Some(NuclearChannel::Elastic) || track.energy <= 0.0 {
        return;
    }
    let recoil = ELASTIC_RECOIL_FRACTION * track.energy;
    track.energy -= recoil;
    ctx.deposit += recoil;
    let theta = ELASTIC_MEAN_ANGLE * exponential(ctx.rng);
    let phi = azimuth(ctx.rng);
    track.direction = deflect(&track.direction, theta, phi);
}

pub(super) fn apply_inelastic(track: &mut Track, ctx: &mut StepContext<'_>) {
    if ctx.channel != Some(NuclearChannel::Inelastic) || track.energy <= 0.0 {
        return;
    }
    let energy = track.energy;
    ctx.deposit += INELASTIC_LOCAL_FRACTION * energy;

    let secondary_energy = INELASTIC_SECONDARY_FRACTION * energy;
    if secondary_energy > ctx.cutoff_energy {
        let theta = INELASTIC_SECONDARY_MEAN_ANGLE * exponential(ctx.rng);
        let phi = azimuth(ctx.rng);
        let mut secondary = Track::new(
            Particle::Proton,
            track.position,
            deflect(&track.direction, theta, phi),
            secondary_energy,
        );
        secondary.interaction_lengths = exponential(ctx.rng);
        ctx.secondaries.push(secondary);
    } else {
        ctx.deposit += secondary_energy;
    }

    track.energy = 0.0;
    ctx.absorbed = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn cross_sections_scale_with_density_and_vanish_below_threshold() {
        let water = Medium::water();
        let bone = Medium::from(&crate::core::models::material::Material::new(
            "bone", 1.85, 1.7, 14.87, 0.53,
        ));
        let p = Track::new(Particle::Proton, Point3::origin(), Vector3::z(), 100.0);
        let (el_w, inel_w) = cross_sections(&p, &water, 10.0);
        let (_, inel_b) = cross_sections(&p, &bone, 10.0);
        assert!(el_w > 0.0 && inel_w > el_w);
        assert!((inel_b / inel_w - 1.85).abs() < 1e-12);

        let slow = Track::new(Particle::Proton, Point3::origin(), Vector3::z(), 5.0);
        assert_eq!(cross_sections(&slow, &water, 10.0), (0.0, 0.0));
        let n = Track::new(Particle::Neutron, Point3::origin(), Vector3::z(), 100.0);
        assert_eq!(cross_sections(&n, &water, 10.0), (0.0, 0.0));
    }
}
