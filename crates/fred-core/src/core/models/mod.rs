//! # Core Models Module
//!
//! Data structures describing a transport scene: the region tree, materials,
//! particle species, primaries and beams.
//!
//! ## Key Components
//!
//! - [`scene`] - Arena of regions rooted at the room, with frame resolution and scorer ownership
//! - [`region`] - A voxelized box with a frame relative to its parent
//! - [`material`] - Named transport media and the material registry
//! - [`particle`] - Particle species identified by PDG code
//! - [`ray`] - Phase-space records and the append-only ray store
//! - [`beam`] - Treatment fields and the ray groups placed in them
//! - [`ids`] - Dense integer handles for regions, scorers, materials, fields, beams and rays
//!
//! ## Usage
//!
//! ```ignore
//! use fred::core::models::{ids::MaterialId, scene::RegionTree};
//!
//! let mut tree = RegionTree::new(MaterialId(0));
//! let phantom = tree.add("Phantom", MaterialId(2))?;
//! tree.set_voxels(phantom, [41, 41, 400])?;
//! ```

pub mod beam;
pub mod ids;
pub mod material;
pub mod particle;
pub mod ray;
pub mod region;
pub mod scene;
