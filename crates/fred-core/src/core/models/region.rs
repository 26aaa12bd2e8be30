use super::ids::{MaterialId, RegionId};
use crate::core::frame::FrameOfReference;
use crate::core::scoring::Scorer;
use crate::core::utils::geometry::BoxGrid;
use nalgebra::Vector3;

/// Per-voxel water-equivalent densities of a heterogeneous region.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMap {
    pub dims: [usize; 3],
    pub densities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionMaterial {
    Homogeneous(MaterialId),
    Heterogeneous(DensityMap),
}

/// A node of the scene tree: a voxelized box placed in its parent's frame.
#[derive(Debug, Clone)]
pub struct Region {
    pub(crate) name: String,
    pub(crate) extent: Vector3<f64>,
    pub(crate) pivot: Vector3<f64>,
    pub(crate) voxels: [usize; 3],
    /// Placement relative to the parent region.
    pub(crate) frame: FrameOfReference,
    pub(crate) parent: Option<RegionId>,
    pub(crate) children: Vec<RegionId>,
    pub(crate) active: bool,
    pub(crate) material: RegionMaterial,
    pub(crate) scorers: Vec<Scorer>,
}

impl Region {
    pub(crate) fn new(name: &str, parent: Option<RegionId>, material: MaterialId) -> Self {
        Self {
            name: name.to_string(),
            extent: Vector3::new(1.0, 1.0, 1.0),
            pivot: Vector3::new(0.5, 0.5, 0.5),
            voxels: [1, 1, 1],
            frame: FrameOfReference::identity(),
            parent,
            children: Vec::new(),
            active: true,
            material: RegionMaterial::Homogeneous(material),
            scorers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.extent
    }

    pub fn pivot(&self) -> Vector3<f64> {
        self.pivot
    }

    pub fn voxels(&self) -> [usize; 3] {
        self.voxels
    }

    pub fn num_voxels(&self) -> usize {
        self.voxels.iter().product()
    }

    /// Frame of the region relative to its parent.
    pub fn frame(&self) -> &FrameOfReference {
        &self.frame
    }

    pub fn parent(&self) -> Option<RegionId> {
        self.parent
    }

    pub fn children(&self) -> &[RegionId] {
        &self.children
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn material(&self) -> &RegionMaterial {
        &self.material
    }

    /// Single material of a homogeneous region; `None` when voxelized.
    pub fn material_id(&self) -> Option<MaterialId> {
        match &self.material {
            RegionMaterial::Homogeneous(id) => Some(*id),
            RegionMaterial::Heterogeneous(_) => None,
        }
    }

    pub fn scorers(&self) -> &[Scorer] {
        &self.scorers
    }

    pub fn grid(&self) -> BoxGrid {
        BoxGrid::from_extent(&self.extent, &self.pivot, self.voxels)
    }
}
