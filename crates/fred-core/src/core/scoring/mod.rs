//! Voxel scoring grids attached to regions.
//!
//! A [`scorer::Scorer`] owns raw per-voxel sums in a [`scorer::ScoreBuffer`].
//! Tracking workers fill private buffers of the same layout which are merged
//! back into the scorers once an invocation completes, after which clients can
//! evaluate the sums into physical units and export them.

pub mod scorer;

pub use scorer::{ScoreBuffer, Scorer, ScorerKind, ScorerState, ScoringError};
