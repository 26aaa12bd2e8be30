//! # fred
//!
//! A scene, tracking and voxel scoring engine for Monte-Carlo transport of
//! protons and light ions through voxelized geometry.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture so that the geometry,
//! the transport machinery and the public API can be tested in isolation.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`RegionTree`,
//!   `MaterialTable`, `RayStore`), frame-of-reference math, per-voxel scoring
//!   buffers and voxel-grid file I/O.
//!
//! - **[`engine`]: The Logic Core.** The lifecycle state machine, engine
//!   configuration, the ordered physics module chain, the immutable tracking
//!   context shared by worker threads, per-history transport, the external
//!   module host and the API error type with its classic status codes.
//!
//! - **[`workflows`]: The Public API.** The owned [`Simulation`] context tying
//!   `engine` and `core` together, and the parallel tracking workflow.
//!
//! Log output goes through `tracing`; [`logging`] installs a subscriber and
//! redirects console output.

pub mod core;
pub mod engine;
pub mod logging;
pub mod workflows;

pub use engine::error::{ErrorKind, FredError};
pub use workflows::simulation::Simulation;
