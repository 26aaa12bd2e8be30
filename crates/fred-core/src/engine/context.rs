//! Immutable snapshot of the scene read by every tracking worker.
//!
//! Absolute transforms, visible children and per-voxel media are resolved once
//! at the start of an invocation so that workers never touch the mutable
//! region tree.

use super::config::TrackingConfig;
use super::error::FredError;
use super::physics::{Medium, ModuleChain};
use super::plugin::ExternalModule;
use crate::core::models::ids::{RegionId, ScorerId};
use crate::core::models::material::MaterialTable;
use crate::core::models::region::RegionMaterial;
use crate::core::models::scene::RegionTree;
use crate::core::scoring::ScorerKind;
use crate::core::utils::geometry::BoxGrid;
use nalgebra::{Isometry3, Point3, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub enum MediumSource {
    Uniform(Medium),
    /// Water-equivalent density per voxel.
    Voxelized(Vec<f64>),
}

impl MediumSource {
    pub fn at(&self, voxel: usize) -> Medium {
        match self {
            MediumSource::Uniform(medium) => *medium,
            MediumSource::Voxelized(densities) => {
                Medium::water_equivalent(densities.get(voxel).copied().unwrap_or(0.0))
            }
        }
    }
}

/// One scorer buffer written during tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    pub region: RegionId,
    pub scorer: ScorerId,
    pub kind: ScorerKind,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedRegion {
    pub id: RegionId,
    pub to_global: Isometry3<f64>,
    pub from_global: Isometry3<f64>,
    pub grid: BoxGrid,
    /// Nearest active descendants, by arena index.
    pub children: Vec<usize>,
    pub medium: MediumSource,
    /// Indices into [`TrackingContext::slots`].
    pub slots: Vec<usize>,
}

/// Region containing a point, with the point in that region's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub region: usize,
    pub local: Point3<f64>,
}

pub struct TrackingContext<'a> {
    pub regions: Vec<ResolvedRegion>,
    pub slots: Vec<SlotSpec>,
    pub chain: ModuleChain,
    pub config: TrackingConfig,
    pub seed_root: u64,
    pub plugin: Option<&'a dyn ExternalModule>,
}

impl<'a> TrackingContext<'a> {
    pub fn resolve(
        tree: &RegionTree,
        materials: &MaterialTable,
        chain: ModuleChain,
        config: TrackingConfig,
        seed_root: u64,
        plugin: Option<&'a dyn ExternalModule>,
    ) -> Result<Self, FredError> {
        let mut regions = Vec::with_capacity(tree.len());
        let mut slots = Vec::new();
        for (id, region) in tree.iter() {
            let to_global = tree.absolute_isometry(id)?;
            let medium = match region.material() {
                RegionMaterial::Homogeneous(material) => {
                    let material = materials
                        .get(*material)
                        .ok_or(FredError::MaterialIndexNotFound(*material))?;
                    MediumSource::Uniform(Medium::from(material))
                }
                RegionMaterial::Heterogeneous(map) => {
                    MediumSource::Voxelized(map.densities.clone())
                }
            };
            let mut region_slots = Vec::with_capacity(region.scorers().len());
            for (i, scorer) in region.scorers().iter().enumerate() {
                region_slots.push(slots.len());
                slots.push(SlotSpec {
                    region: id,
                    scorer: ScorerId(i),
                    kind: scorer.kind(),
                    len: scorer.len(),
                });
            }
            regions.push(ResolvedRegion {
                id,
                to_global,
                from_global: to_global.inverse(),
                grid: region.grid(),
                children: tree
                    .visible_children(id)?
                    .into_iter()
                    .map(|c| c.index())
                    .collect(),
                medium,
                slots: region_slots,
            });
        }
        Ok(Self {
            regions,
            slots,
            chain,
            config,
            seed_root,
            plugin,
        })
    }

    /// Deepest visible region whose box contains `p`; `None` outside the room.
    pub fn locate(&self, p: &Point3<f64>) -> Option<Location> {
        let room = self.regions.first()?;
        let local = room.from_global * p;
        if !room.grid.contains(&local) {
            return None;
        }
        let mut location = Location { region: 0, local };
        'descend: loop {
            for &child in &self.regions[location.region].children {
                let region = &self.regions[child];
                let local = region.from_global * p;
                if region.grid.contains(&local) {
                    location = Location {
                        region: child,
                        local,
                    };
                    continue 'descend;
                }
            }
            return Some(location);
        }
    }

    /// Distance along the global direction `dir` to the next boundary seen
    /// from `location`: the box exit, a voxel plane, or a visible child.
    pub fn distance_to_boundary(&self, location: &Location, dir: &Vector3<f64>) -> f64 {
        let region = &self.regions[location.region];
        let local_dir = region.from_global * dir;
        let mut distance = region
            .grid
            .distance_to_exit(&location.local, &local_dir)
            .min(region.grid.distance_to_voxel_boundary(&location.local, &local_dir));
        if !region.children.is_empty() {
            let global = region.to_global * location.local;
            for &child in &region.children {
                let child = &self.regions[child];
                let p = child.from_global * global;
                let d = child.from_global * dir;
                if let Some(entry) = child.grid.distance_to_entry(&p, &d) {
                    distance = distance.min(entry);
                }
            }
        }
        distance
    }
}
