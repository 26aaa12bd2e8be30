//! Transport modules invoked once per condensed-history step.
//!
//! Modules run in a fixed order: energy loss, multiple scattering,
//! straggling, nuclear elastic, nuclear non-elastic. A [`ModuleChain`] is
//! built from the physics switches at the start of every tracking invocation
//! and shared read-only by all workers.

pub mod nuclear;
pub mod scattering;
pub mod stopping;
pub mod straggling;

use crate::core::models::material::{Material, WATER_RADIATION_LENGTH_CM, WATER_Z_OVER_A};
use crate::core::models::particle::Particle;
use crate::engine::config::{PhysicsSwitches, TrackingConfig, TransportProcess};
use crate::engine::utils::sampling::exponential;
use nalgebra::{Point3, Vector3};
use rand::Rng;
use rand::rngs::StdRng;

/// Transport properties of the medium at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Medium {
    pub density: f64,
    pub relative_stopping_power: f64,
    pub radiation_length: f64,
    pub z_over_a: f64,
}

impl Medium {
    pub fn water() -> Self {
        Self::water_equivalent(1.0)
    }

    pub fn vacuum() -> Self {
        Self {
            density: 0.0,
            relative_stopping_power: 0.0,
            radiation_length: f64::INFINITY,
            z_over_a: 0.0,
        }
    }

    /// Water scaled to `density`, as derived from CT numbers.
    pub fn water_equivalent(density: f64) -> Self {
        if density <= 0.0 {
            return Self::vacuum();
        }
        Self {
            density,
            relative_stopping_power: density,
            radiation_length: WATER_RADIATION_LENGTH_CM / density,
            z_over_a: WATER_Z_OVER_A,
        }
    }
}

impl From<&Material> for Medium {
    fn from(m: &Material) -> Self {
        Self {
            density: m.density,
            relative_stopping_power: m.relative_stopping_power,
            radiation_length: m.radiation_length,
            z_over_a: m.z_over_a,
        }
    }
}

/// Dynamic state of a particle being transported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub particle: Particle,
    pub position: Point3<f64>,
    pub direction: Vector3<f64>,
    pub energy: f64,
    /// Interaction lengths left before the next nuclear event.
    pub interaction_lengths: f64,
}

impl Track {
    pub fn new(
        particle: Particle,
        position: Point3<f64>,
        direction: Vector3<f64>,
        energy: f64,
    ) -> Self {
        Self {
            particle,
            position,
            direction,
            energy,
            interaction_lengths: f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NuclearChannel {
    Elastic,
    Inelastic,
}

/// Mutable view of one step handed to every module in turn.
pub struct StepContext<'s> {
    pub medium: &'s Medium,
    pub length: f64,
    pub pre_energy: f64,
    /// Energy deposited locally during the step (MeV).
    pub deposit: f64,
    /// Continuous part of the loss, the quantity straggling perturbs.
    pub continuous_loss: f64,
    pub channel: Option<NuclearChannel>,
    pub absorbed: bool,
    pub cutoff_energy: f64,
    pub secondaries: &'s mut Vec<Track>,
    pub rng: &'s mut StdRng,
}

/// One entry of the module chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportModule {
    EnergyLoss,
    MultipleScattering,
    Straggling,
    NuclearElastic,
    NuclearInelastic,
}

impl TransportModule {
    pub const ORDER: [TransportModule; 5] = [
        TransportModule::EnergyLoss,
        TransportModule::MultipleScattering,
        TransportModule::Straggling,
        TransportModule::NuclearElastic,
        TransportModule::NuclearInelastic,
    ];

    pub fn process(self) -> TransportProcess {
        match self {
            TransportModule::EnergyLoss => TransportProcess::EnergyLoss,
            TransportModule::MultipleScattering => TransportProcess::MultipleScattering,
            TransportModule::Straggling => TransportProcess::Straggling,
            TransportModule::NuclearElastic => TransportProcess::NuclearElastic,
            TransportModule::NuclearInelastic => TransportProcess::NuclearInelastic,
        }
    }

    fn apply(self, track: &mut Track, ctx: &mut StepContext<'_>) {
        match self {
            TransportModule::EnergyLoss => stopping::apply(track, ctx),
            TransportModule::MultipleScattering => scattering::apply(track, ctx),
            TransportModule::Straggling => straggling::apply(track, ctx),
            TransportModule::NuclearElastic => nuclear::apply_elastic(track, ctx),
            TransportModule::NuclearInelastic => nuclear::apply_inelastic(track, ctx),
        }
    }
}

/// Physics proposal for the next step length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLimit {
    pub distance: f64,
    /// The step ends on a nuclear interaction point.
    pub nuclear: bool,
}

/// Enabled modules in their fixed invocation order.
#[derive(Debug, Clone)]
pub struct ModuleChain {
    modules: Vec<TransportModule>,
    switches: PhysicsSwitches,
    max_step: f64,
    nuclear_threshold: f64,
}

impl ModuleChain {
    pub fn new(switches: PhysicsSwitches, config: &TrackingConfig) -> Self {
        let modules = TransportModule::ORDER
            .into_iter()
            .filter(|m| switches.is_enabled(m.process()))
            .collect();
        Self {
            modules,
            switches,
            max_step: config.max_step,
            nuclear_threshold: config.nuclear_threshold,
        }
    }

    pub fn modules(&self) -> &[TransportModule] {
        &self.modules
    }

    /// Enabled elastic and non-elastic cross sections for the track.
    fn nuclear_cross_sections(&self, track: &Track, medium: &Medium) -> (f64, f64) {
        let (el, inel) = nuclear::cross_sections(track, medium, self.nuclear_threshold);
        (
            if self.switches.nuclear_elastic { el } else { 0.0 },
            if self.switches.nuclear_inelastic { inel } else { 0.0 },
        )
    }

    pub fn step_limit(&self, track: &Track, medium: &Medium) -> StepLimit {
        let mut limit = StepLimit {
            distance: if medium.density > 0.0 {
                self.max_step
            } else {
                f64::INFINITY
            },
            nuclear: false,
        };
        if self.switches.energy_loss {
            limit.distance = limit
                .distance
                .min(stopping::step_limit(track, medium, self.max_step));
        }
        let (el, inel) = self.nuclear_cross_sections(track, medium);
        let total = el + inel;
        if total > 0.0 {
            let distance = track.interaction_lengths / total;
            if distance < limit.distance {
                limit = StepLimit {
                    distance,
                    nuclear: true,
                };
            }
        }
        limit
    }

    /// Runs every enabled module on a step of `ctx.length` that ended at the
    /// track's current position.
    pub fn apply(&self, track: &mut Track, ctx: &mut StepContext<'_>, nuclear_due: bool) {
        let (el, inel) = self.nuclear_cross_sections(track, ctx.medium);
        let total = el + inel;
        if nuclear_due && total > 0.0 {
            ctx.channel = Some(if ctx.rng.r#gen::<f64>() * total < el {
                NuclearChannel::Elastic
            } else {
                NuclearChannel::Inelastic
            });
        } else if total > 0.0 {
            track.interaction_lengths = (track.interaction_lengths - total * ctx.length).max(0.0);
        }

        for module in &self.modules {
            module.apply(track, ctx);
        }

        if ctx.channel.is_some() {
            track.interaction_lengths = exponential(ctx.rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::utils::sampling::history_rng;

    fn proton(energy: f64) -> Track {
        let mut t = Track::new(Particle::Proton, Point3::origin(), Vector3::z(), energy);
        t.interaction_lengths = 1.0;
        t
    }

    fn run_step(chain: &ModuleChain, track: &mut Track, length: f64, nuclear_due: bool) -> (f64, Vec<Track>, bool) {
        let medium = Medium::water();
        let mut rng = history_rng(11, 0);
        let mut secondaries = Vec::new();
        let mut ctx = StepContext {
            medium: &medium,
            length,
            pre_energy: track.energy,
            deposit: 0.0,
            continuous_loss: 0.0,
            channel: None,
            absorbed: false,
            cutoff_energy: 1.0,
            secondaries: &mut secondaries,
            rng: &mut rng,
        };
        chain.apply(track, &mut ctx, nuclear_due);
        let (deposit, absorbed) = (ctx.deposit, ctx.absorbed);
        (deposit, secondaries, absorbed)
    }

    #[test]
    fn chain_preserves_fixed_order_of_enabled_modules() {
        let mut switches = PhysicsSwitches::default();
        switches.set(TransportProcess::Straggling, false);
        let chain = ModuleChain::new(switches, &TrackingConfig::default());
        assert_eq!(
            chain.modules(),
            &[
                TransportModule::EnergyLoss,
                TransportModule::MultipleScattering,
                TransportModule::NuclearElastic,
                TransportModule::NuclearInelastic,
            ]
        );
    }

    #[test]
    fn energy_is_conserved_by_continuous_loss() {
        let mut switches = PhysicsSwitches::none();
        switches.energy_loss = true;
        let chain = ModuleChain::new(switches, &TrackingConfig::default());
        let mut track = proton(100.0);
        let (deposit, _, _) = run_step(&chain, &mut track, 1.0, false);
        assert!(deposit > 5.0 && deposit < 10.0, "deposit = {deposit}");
        assert!((track.energy + deposit - 100.0).abs() < 1e-9);
    }

    #[test]
    fn step_beyond_range_stops_the_particle() {
        let mut switches = PhysicsSwitches::none();
        switches.energy_loss = true;
        let chain = ModuleChain::new(switches, &TrackingConfig::default());
        let mut track = proton(50.0);
        let (deposit, _, _) = run_step(&chain, &mut track, 10.0, false);
        assert_eq!(track.energy, 0.0);
        assert!((deposit - 50.0).abs() < 1e-9);
    }

    #[test]
    fn straggling_keeps_energy_balance() {
        let mut switches = PhysicsSwitches::none();
        switches.energy_loss = true;
        switches.straggling = true;
        let chain = ModuleChain::new(switches, &TrackingConfig::default());
        let mut track = proton(100.0);
        let (deposit, _, _) = run_step(&chain, &mut track, 1.0, false);
        assert!(deposit >= 0.0);
        assert!((track.energy + deposit - 100.0).abs() < 1e-9);
    }

    #[test]
    fn disabled_modules_leave_track_untouched() {
        let chain = ModuleChain::new(PhysicsSwitches::none(), &TrackingConfig::default());
        let mut track = proton(100.0);
        let before = track;
        let (deposit, secondaries, absorbed) = run_step(&chain, &mut track, 1.0, true);
        assert_eq!(deposit, 0.0);
        assert!(secondaries.is_empty() && !absorbed);
        assert_eq!(track, before);
    }

    #[test]
    fn nuclear_limit_follows_remaining_interaction_lengths() {
        let mut switches = PhysicsSwitches::none();
        switches.nuclear_inelastic = true;
        let chain = ModuleChain::new(switches, &TrackingConfig::default());
        let mut track = proton(100.0);
        track.interaction_lengths = 0.0058;
        let limit = chain.step_limit(&track, &Medium::water());
        assert!(limit.nuclear);
        assert!((limit.distance - 0.5).abs() < 1e-9);

        let (deposit, secondaries, absorbed) = run_step(&chain, &mut track, limit.distance, true);
        assert!(absorbed);
        assert_eq!(track.energy, 0.0);
        assert_eq!(secondaries.len(), 1);
        assert_eq!(secondaries[0].particle, Particle::Proton);
        assert!((deposit + secondaries[0].energy - 70.0).abs() < 1e-9);
        assert!(track.interaction_lengths > 0.0);
    }

    #[test]
    fn vacuum_imposes_no_physics_step_limit() {
        let chain = ModuleChain::new(PhysicsSwitches::default(), &TrackingConfig::default());
        let limit = chain.step_limit(&proton(100.0), &Medium::vacuum());
        assert!(limit.distance.is_infinite());
        assert!(!limit.nuclear);
    }
}
