//! Provides input/output functionality for voxel-grid file formats.
//!
//! Scorer grids are exported and CT maps imported through the [`traits::VoxelGridFile`]
//! interface; [`metaimage`] implements the single-file MetaImage format used by default.

pub mod containers;
pub mod metaimage;
pub mod traits;
