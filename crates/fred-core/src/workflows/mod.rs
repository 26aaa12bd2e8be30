//! # Workflows Module
//!
//! The public entry points of the library.
//!
//! ## Overview
//!
//! A [`simulation::Simulation`] owns everything a transport run needs: the region
//! tree rooted at the room, the material table, the ray store and beams, the
//! scorers, the physics switches and the worker pool. Clients build a scene,
//! attach scorers, load primaries and then call one of the tracking entry points
//! any number of times, reading or exporting the accumulated scores in between.
//!
//! ## Architecture
//!
//! - **Simulation context** ([`simulation`]) - Scene setup, lifecycle guards,
//!   ray and beam management, scorer evaluation and export.
//! - **Tracking workflow** ([`track`]) - Splits primaries across the worker pool,
//!   transports them against an immutable scene snapshot and merges the
//!   per-worker tallies in a fixed order.
//!
//! ## Usage
//!
//! ```ignore
//! use fred::workflows::simulation::Simulation;
//!
//! let mut sim = Simulation::init("data")?;
//! let phantom = sim.add_region("Phantom")?;
//! sim.set_region_extent(phantom, Vector3::new(4.0, 4.0, 10.0))?;
//! let edep = sim.add_scorer(phantom, ScorerKind::EnergyDeposit)?;
//! sim.add_rays(Particle::Proton, &rays)?;
//! sim.track_rays(0, None)?;
//! sim.save_scorer(phantom, edep, "edep")?;
//! ```

pub mod simulation;
pub mod track;
