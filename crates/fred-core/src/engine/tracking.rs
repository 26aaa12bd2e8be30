//! Condensed-history transport of single histories through the resolved scene.

use super::context::{Location, TrackingContext};
use super::physics::{StepContext, StepLimit, Track};
use super::plugin::StepInfo;
use super::progress::{Progress, ProgressReporter};
use super::state::TrackingReport;
use super::tally::Tally;
use super::utils::sampling::{exponential, history_rng};
use crate::core::models::particle::TransportClass;
use rand::rngs::StdRng;
use tracing::{trace, warn};

/// Push applied past a geometric boundary so the next step starts on the far side.
pub const BOUNDARY_NUDGE_CM: f64 = 1e-6;

/// A primary particle in global coordinates, keyed by its index in the
/// invocation range for seeding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primary {
    pub index: u64,
    pub track: Track,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Escaped,
    Stopped,
    Absorbed,
    Aborted,
}

/// Transports a contiguous chunk of primaries into a fresh partial tally.
pub fn run_chunk(
    ctx: &TrackingContext<'_>,
    primaries: &[Primary],
    reporter: &ProgressReporter,
) -> (Tally, TrackingReport) {
    let mut tally = Tally::new(&ctx.slots);
    let mut report = TrackingReport::default();
    for primary in primaries {
        run_history(ctx, primary, &mut tally, &mut report);
        reporter.report(Progress::TaskIncrement { amount: 1 });
    }
    (tally, report)
}

/// Tracks one primary and all of its secondaries, depth first.
pub fn run_history(
    ctx: &TrackingContext<'_>,
    primary: &Primary,
    tally: &mut Tally,
    report: &mut TrackingReport,
) {
    let mut rng = history_rng(ctx.seed_root, primary.index);
    let mut track = primary.track;
    track.interaction_lengths = exponential(&mut rng);
    let mut stack = vec![track];
    report.primaries += 1;

    while let Some(mut track) = stack.pop() {
        let before = stack.len();
        let fate = transport(ctx, &mut track, &mut rng, &mut stack, tally, report);
        report.secondaries += (stack.len() - before) as u64;
        match fate {
            Fate::Escaped => report.escaped += 1,
            Fate::Stopped => report.stopped += 1,
            Fate::Absorbed => report.absorbed += 1,
            Fate::Aborted => report.aborted += 1,
        }
    }
}

fn score(
    ctx: &TrackingContext<'_>,
    tally: &mut Tally,
    location: &Location,
    voxel: usize,
    length: f64,
    deposit: f64,
    entered: bool,
) {
    for &slot in &ctx.regions[location.region].slots {
        tally.score(&ctx.slots[slot], slot, voxel, length, deposit, entered);
    }
}

fn transport(
    ctx: &TrackingContext<'_>,
    track: &mut Track,
    rng: &mut StdRng,
    stack: &mut Vec<Track>,
    tally: &mut Tally,
    report: &mut TrackingReport,
) -> Fate {
    let class = track.particle.transport_class();
    let charged = class == TransportClass::ChargedHadron;
    let mut last_voxel: Option<(usize, usize)> = None;
    let mut steps = 0usize;

    loop {
        let Some(location) = ctx.locate(&track.position) else {
            trace!(particle = %track.particle, energy = track.energy, "Particle escaped.");
            return Fate::Escaped;
        };
        let region = &ctx.regions[location.region];
        let voxel = region.grid.voxel_of(&location.local);
        let entered = last_voxel != Some((location.region, voxel));
        last_voxel = Some((location.region, voxel));

        if class == TransportClass::LocalDeposit
            || (charged && track.energy < ctx.config.cutoff_energy)
        {
            score(ctx, tally, &location, voxel, 0.0, track.energy, entered);
            track.energy = 0.0;
            return Fate::Stopped;
        }
        if steps >= ctx.config.max_steps_per_track {
            warn!(
                particle = %track.particle,
                energy = track.energy,
                steps,
                "Step limit reached, aborting history."
            );
            return Fate::Aborted;
        }
        steps += 1;
        report.steps += 1;

        let medium = region.medium.at(voxel);
        let geometric = ctx.distance_to_boundary(&location, &track.direction);
        let limit = if charged {
            ctx.chain.step_limit(track, &medium)
        } else {
            StepLimit {
                distance: f64::INFINITY,
                nuclear: false,
            }
        };
        let (length, on_boundary, nuclear_due) = if limit.distance < geometric {
            (limit.distance, false, limit.nuclear)
        } else {
            (geometric, true, false)
        };
        if !length.is_finite() {
            warn!(particle = %track.particle, "No boundary ahead, aborting history.");
            return Fate::Aborted;
        }

        track.position += track.direction * length;
        let mut deposit = 0.0;
        let mut absorbed = false;
        if charged {
            let mut step = StepContext {
                medium: &medium,
                length,
                pre_energy: track.energy,
                deposit: 0.0,
                continuous_loss: 0.0,
                channel: None,
                absorbed: false,
                cutoff_energy: ctx.config.cutoff_energy,
                secondaries: &mut *stack,
                rng: &mut *rng,
            };
            ctx.chain.apply(track, &mut step, nuclear_due);
            deposit = step.deposit;
            absorbed = step.absorbed;

            if let Some(module) = ctx.plugin {
                let mut info = StepInfo {
                    region: region.id,
                    voxel,
                    particle: track.particle,
                    position: track.position,
                    direction: track.direction,
                    energy: track.energy,
                    step_length: length,
                    deposit,
                    kill: false,
                };
                module.on_step(&mut info);
                track.energy = info.energy.max(0.0);
                if let Some(direction) = info.direction.try_normalize(f64::EPSILON) {
                    track.direction = direction;
                }
                deposit = info.deposit;
                absorbed |= info.kill;
            }
        }

        score(ctx, tally, &location, voxel, length, deposit, entered);
        trace!(
            region = %region.id,
            voxel,
            length,
            deposit,
            energy = track.energy,
            "Step."
        );

        if absorbed {
            return Fate::Absorbed;
        }
        if track.energy <= 0.0 {
            return Fate::Stopped;
        }
        if on_boundary {
            track.position += track.direction * BOUNDARY_NUDGE_CM;
        }
    }
}
