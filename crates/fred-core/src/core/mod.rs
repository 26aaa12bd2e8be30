//! # Core Module
//!
//! Stateless building blocks of the transport engine.
//!
//! - **Frames of reference** ([`frame`]) - Orthonormal basis completion and rigid transforms
//! - **Scene description** ([`models`]) - Regions, materials, particles, rays and beams
//! - **Scoring** ([`scoring`]) - Per-voxel accumulation buffers and their normalization
//! - **File I/O** ([`io`]) - Voxel-grid file formats and voxel-map loaders
//! - **Geometry utilities** ([`utils`]) - Box/voxel intersection arithmetic

pub mod frame;
pub mod io;
pub mod models;
pub mod scoring;
pub mod utils;
