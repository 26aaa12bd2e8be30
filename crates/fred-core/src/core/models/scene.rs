use super::ids::{FieldId, MaterialId, RegionId, ScorerId};
use super::region::{DensityMap, Region, RegionMaterial};
use crate::core::frame::{FrameError, FrameOfReference};
use crate::core::scoring::{Scorer, ScorerKind};
use nalgebra::{Isometry3, Point3, Vector3};
use std::collections::HashMap;
use thiserror::Error;

pub const ROOM_NAME: &str = "Room";
/// Edge length of the default room cube in cm.
pub const ROOM_EXTENT_CM: f64 = 200.0;
/// Largest number of voxels a single region may hold.
pub const MAX_REGION_VOXELS: usize = u32::MAX as usize;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("Region {0} not found")]
    RegionNotFound(RegionId),
    #[error("Region '{0}' is already defined")]
    RegionAlreadyDefined(String),
    #[error("Ill-defined {what}: {value:?}")]
    IllDefinedDimensions { what: &'static str, value: [f64; 3] },
    #[error("Making region {parent} the parent of region {child} would create a cycle")]
    ParentCycle { child: RegionId, parent: RegionId },
    #[error("The room region cannot be {0}")]
    RoomImmutable(&'static str),
    #[error("Voxel layout of region {region} is locked: {reason}")]
    VoxelLayoutLocked {
        region: RegionId,
        reason: &'static str,
    },
    #[error("Scorer {scorer} not found in region {region}")]
    ScorerNotFound { region: RegionId, scorer: ScorerId },
    #[error("Reference {0:?} is not part of the region tree")]
    ForeignReference(Reference),
    #[error("Frame error: {source}")]
    Frame {
        #[from]
        source: FrameError,
    },
}

fn check_extent(extent: &Vector3<f64>) -> Result<(), SceneError> {
    if extent.iter().any(|l| !l.is_finite() || *l <= 0.0) {
        return Err(SceneError::IllDefinedDimensions {
            what: "extent",
            value: [extent.x, extent.y, extent.z],
        });
    }
    Ok(())
}

/// Total voxel count, rejecting empty axes and grids beyond [`MAX_REGION_VOXELS`].
fn checked_voxel_count(voxels: [usize; 3]) -> Result<usize, SceneError> {
    voxels
        .iter()
        .try_fold(1usize, |n, v| n.checked_mul(*v))
        .filter(|n| (1..=MAX_REGION_VOXELS).contains(n))
        .ok_or(SceneError::IllDefinedDimensions {
            what: "voxel counts",
            value: voxels.map(|n| n as f64),
        })
}

fn check_density_map(id: RegionId, region: &Region, map: &DensityMap) -> Result<(), SceneError> {
    let count = checked_voxel_count(map.dims)?;
    if map.densities.len() != count {
        return Err(SceneError::IllDefinedDimensions {
            what: "density map",
            value: [map.densities.len() as f64, count as f64, 0.0],
        });
    }
    if !region.scorers.is_empty() && region.voxels != map.dims {
        return Err(SceneError::VoxelLayoutLocked {
            region: id,
            reason: "scorers are attached",
        });
    }
    Ok(())
}

/// Frame in which positions and orientations are given or requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reference {
    #[default]
    Global,
    Region(RegionId),
    /// A treatment field; its frame is always stored in global coordinates.
    Field(FieldId),
}

/// Arena of regions forming a strict tree rooted at the room.
#[derive(Debug, Clone)]
pub struct RegionTree {
    regions: Vec<Region>,
    by_name: HashMap<String, RegionId>,
}

impl RegionTree {
    /// A tree holding only the room, filled with `room_material`.
    pub fn new(room_material: MaterialId) -> Self {
        let mut room = Region::new(ROOM_NAME, None, room_material);
        room.extent = Vector3::repeat(ROOM_EXTENT_CM);
        let mut by_name = HashMap::new();
        by_name.insert(ROOM_NAME.to_string(), RegionId::ROOM);
        Self {
            regions: vec![room],
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions
            .iter()
            .enumerate()
            .map(|(i, r)| (RegionId(i), r))
    }

    pub fn index(&self, name: &str) -> Option<RegionId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: RegionId) -> Result<&Region, SceneError> {
        self.regions
            .get(id.0)
            .ok_or(SceneError::RegionNotFound(id))
    }

    fn get_mut(&mut self, id: RegionId) -> Result<&mut Region, SceneError> {
        self.regions
            .get_mut(id.0)
            .ok_or(SceneError::RegionNotFound(id))
    }

    /// Adds a region filled with `material` as a child of the room.
    pub fn add(&mut self, name: &str, material: MaterialId) -> Result<RegionId, SceneError> {
        if self.by_name.contains_key(name) {
            return Err(SceneError::RegionAlreadyDefined(name.to_string()));
        }
        let id = RegionId(self.regions.len());
        self.regions
            .push(Region::new(name, Some(RegionId::ROOM), material));
        self.regions[RegionId::ROOM.0].children.push(id);
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn set_extent(&mut self, id: RegionId, extent: Vector3<f64>) -> Result<(), SceneError> {
        check_extent(&extent)?;
        self.get_mut(id)?.extent = extent;
        Ok(())
    }

    pub fn set_pivot(&mut self, id: RegionId, pivot: Vector3<f64>) -> Result<(), SceneError> {
        if pivot.iter().any(|p| !p.is_finite() || *p < 0.0 || *p > 1.0) {
            return Err(SceneError::IllDefinedDimensions {
                what: "pivot",
                value: [pivot.x, pivot.y, pivot.z],
            });
        }
        self.get_mut(id)?.pivot = pivot;
        Ok(())
    }

    pub fn set_voxels(&mut self, id: RegionId, voxels: [usize; 3]) -> Result<(), SceneError> {
        checked_voxel_count(voxels)?;
        let region = self.get_mut(id)?;
        if region.voxels == voxels {
            return Ok(());
        }
        if !region.scorers.is_empty() {
            return Err(SceneError::VoxelLayoutLocked {
                region: id,
                reason: "scorers are attached",
            });
        }
        if matches!(region.material, RegionMaterial::Heterogeneous(_)) {
            return Err(SceneError::VoxelLayoutLocked {
                region: id,
                reason: "a voxel map defines the layout",
            });
        }
        region.voxels = voxels;
        Ok(())
    }

    pub fn set_material(&mut self, id: RegionId, material: MaterialId) -> Result<(), SceneError> {
        self.get_mut(id)?.material = RegionMaterial::Homogeneous(material);
        Ok(())
    }

    /// Makes the region heterogeneous; its voxel counts follow the map.
    /// Installs a density map together with the extent it covers. Nothing
    /// changes unless both are valid.
    pub fn set_voxel_map(
        &mut self,
        id: RegionId,
        map: DensityMap,
        extent: Vector3<f64>,
    ) -> Result<(), SceneError> {
        check_extent(&extent)?;
        check_density_map(id, self.get(id)?, &map)?;
        let region = self.get_mut(id)?;
        region.voxels = map.dims;
        region.material = RegionMaterial::Heterogeneous(map);
        region.extent = extent;
        Ok(())
    }

    pub fn set_active(&mut self, id: RegionId, active: bool) -> Result<(), SceneError> {
        if id == RegionId::ROOM && !active {
            return Err(SceneError::RoomImmutable("deactivated"));
        }
        self.get_mut(id)?.active = active;
        Ok(())
    }

    /// Re-parents a region, keeping its frame relative to the new parent.
    pub fn set_parent(&mut self, child: RegionId, parent: RegionId) -> Result<(), SceneError> {
        self.get(child)?;
        self.get(parent)?;
        if child == RegionId::ROOM {
            return Err(SceneError::RoomImmutable("re-parented"));
        }
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(SceneError::ParentCycle { child, parent });
            }
            cursor = self.regions[current.0].parent;
        }

        if let Some(old) = self.regions[child.0].parent {
            self.regions[old.0].children.retain(|c| *c != child);
        }
        self.regions[parent.0].children.push(child);
        self.regions[child.0].parent = Some(parent);
        Ok(())
    }

    /// Transform taking region-local points to global coordinates.
    pub fn absolute_isometry(&self, id: RegionId) -> Result<Isometry3<f64>, SceneError> {
        let mut iso = Isometry3::identity();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let region = self.get(current)?;
            iso = region.frame.to_isometry() * iso;
            cursor = region.parent;
        }
        Ok(iso)
    }

    pub fn reference_isometry(&self, reference: Reference) -> Result<Isometry3<f64>, SceneError> {
        match reference {
            Reference::Global => Ok(Isometry3::identity()),
            Reference::Region(id) => self.absolute_isometry(id),
            Reference::Field(_) => Err(SceneError::ForeignReference(reference)),
        }
    }

    pub fn frame_in(
        &self,
        id: RegionId,
        reference: Reference,
    ) -> Result<FrameOfReference, SceneError> {
        let abs = self.absolute_isometry(id)?;
        let reference = self.reference_isometry(reference)?;
        Ok(FrameOfReference::from_isometry(&(reference.inverse() * abs)))
    }

    pub fn set_frame(
        &mut self,
        id: RegionId,
        frame: FrameOfReference,
        reference: Reference,
    ) -> Result<(), SceneError> {
        if id == RegionId::ROOM {
            return Err(SceneError::RoomImmutable("moved"));
        }
        let target = self.reference_isometry(reference)? * frame.to_isometry();
        let parent = match self.get(id)?.parent {
            Some(p) => self.absolute_isometry(p)?,
            None => Isometry3::identity(),
        };
        self.get_mut(id)?.frame = FrameOfReference::from_isometry(&(parent.inverse() * target));
        Ok(())
    }

    pub fn set_origin(
        &mut self,
        id: RegionId,
        origin: Point3<f64>,
        reference: Reference,
    ) -> Result<(), SceneError> {
        let mut frame = self.frame_in(id, reference)?;
        frame.origin = FrameOfReference::from_vectors(origin, None, None, None)?.origin;
        self.set_frame(id, frame, reference)
    }

    /// Nearest active descendants: inactive regions are skipped but their
    /// children still count.
    pub fn visible_children(&self, id: RegionId) -> Result<Vec<RegionId>, SceneError> {
        let mut visible = Vec::new();
        let mut stack: Vec<RegionId> = self.get(id)?.children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let region = &self.regions[current.0];
            if region.active {
                visible.push(current);
            } else {
                stack.extend(region.children.iter().rev().copied());
            }
        }
        Ok(visible)
    }

    /// Attaches a scorer, returning the existing index if the kind is already present.
    pub fn add_scorer(&mut self, id: RegionId, kind: ScorerKind) -> Result<ScorerId, SceneError> {
        let region = self.get_mut(id)?;
        if let Some(pos) = region.scorers.iter().position(|s| s.kind() == kind) {
            return Ok(ScorerId(pos));
        }
        let n = region.num_voxels();
        region.scorers.push(Scorer::new(kind, n));
        Ok(ScorerId(region.scorers.len() - 1))
    }

    pub fn scorer(&self, id: RegionId, scorer: ScorerId) -> Result<&Scorer, SceneError> {
        self.get(id)?
            .scorers
            .get(scorer.0)
            .ok_or(SceneError::ScorerNotFound { region: id, scorer })
    }

    pub fn scorer_mut(
        &mut self,
        id: RegionId,
        scorer: ScorerId,
    ) -> Result<&mut Scorer, SceneError> {
        self.get_mut(id)?
            .scorers
            .get_mut(scorer.0)
            .ok_or(SceneError::ScorerNotFound { region: id, scorer })
    }

    /// Mass density of each voxel of a region.
    pub fn voxel_density(&self, id: RegionId, voxel: usize, material_density: f64) -> f64 {
        match self.regions.get(id.0).map(|r| &r.material) {
            Some(RegionMaterial::Heterogeneous(map)) => {
                map.densities.get(voxel).copied().unwrap_or(0.0)
            }
            _ => material_density,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    const TOLERANCE: f64 = 1e-9;

    fn tree() -> RegionTree {
        RegionTree::new(MaterialId(0))
    }

    #[test]
    fn new_tree_contains_only_the_room() {
        let t = tree();
        assert_eq!(t.len(), 1);
        assert_eq!(t.index(ROOM_NAME), Some(RegionId::ROOM));
        let room = t.get(RegionId::ROOM).unwrap();
        assert_eq!(room.extent(), Vector3::repeat(ROOM_EXTENT_CM));
        assert!(room.parent().is_none());
    }

    #[test]
    fn added_regions_get_sequential_indices_under_room() {
        let mut t = tree();
        let a = t.add("Phantom", MaterialId(0)).unwrap();
        let b = t.add("Cube", MaterialId(0)).unwrap();
        assert_eq!(a, RegionId(1));
        assert_eq!(b, RegionId(2));
        assert_eq!(t.get(b).unwrap().parent(), Some(RegionId::ROOM));
        assert_eq!(t.get(RegionId::ROOM).unwrap().children(), &[a, b]);
        assert!(t.index("missing").is_none());
    }

    #[test]
    fn duplicate_region_name_is_rejected() {
        let mut t = tree();
        t.add("Phantom", MaterialId(0)).unwrap();
        assert_eq!(
            t.add("Phantom", MaterialId(0)),
            Err(SceneError::RegionAlreadyDefined("Phantom".to_string()))
        );
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        let mut t = tree();
        let id = t.add("Phantom", MaterialId(0)).unwrap();
        assert!(t.set_extent(id, Vector3::new(1.0, 0.0, 1.0)).is_err());
        assert!(t.set_pivot(id, Vector3::new(1.5, 0.5, 0.5)).is_err());
        assert!(t.set_voxels(id, [1, 0, 3]).is_err());
        assert!(t.set_extent(RegionId(9), Vector3::repeat(1.0)).is_err());
    }

    #[test]
    fn overflowing_voxel_counts_are_rejected() {
        let mut t = tree();
        let id = t.add("Phantom", MaterialId(0)).unwrap();
        assert!(matches!(
            t.set_voxels(id, [usize::MAX / 2, 3, 1]),
            Err(SceneError::IllDefinedDimensions {
                what: "voxel counts",
                ..
            })
        ));
        assert!(t.set_voxels(id, [1 << 20, 1 << 20, 1]).is_err());
        assert_eq!(t.get(id).unwrap().voxels(), [1, 1, 1]);
        let s = t.add_scorer(id, ScorerKind::Dose).unwrap();
        assert_eq!(t.scorer(id, s).unwrap().len(), 1);
    }

    #[test]
    fn parent_cycle_is_rejected() {
        let mut t = tree();
        let a = t.add("A", MaterialId(0)).unwrap();
        let b = t.add("B", MaterialId(0)).unwrap();
        let c = t.add("C", MaterialId(0)).unwrap();
        t.set_parent(b, a).unwrap();
        t.set_parent(c, b).unwrap();
        assert_eq!(
            t.set_parent(a, c),
            Err(SceneError::ParentCycle {
                child: a,
                parent: c
            })
        );
        assert_eq!(
            t.set_parent(a, a),
            Err(SceneError::ParentCycle {
                child: a,
                parent: a
            })
        );
        assert!(t.set_parent(RegionId::ROOM, a).is_err());
        assert_eq!(t.get(RegionId::ROOM).unwrap().children(), &[a]);
    }

    #[test]
    fn frames_round_trip_through_any_depth() {
        let mut t = tree();
        let a = t.add("A", MaterialId(0)).unwrap();
        let b = t.add("B", MaterialId(0)).unwrap();
        let c = t.add("C", MaterialId(0)).unwrap();
        t.set_parent(b, a).unwrap();
        t.set_parent(c, b).unwrap();

        let fa = FrameOfReference::from_vectors(
            Point3::new(5.0, 0.0, 0.0),
            Some(Vector3::new(1.0, 0.0, 1.0)),
            None,
            None,
        )
        .unwrap();
        let fb = FrameOfReference::from_vectors(
            Point3::new(0.0, 2.0, -1.0),
            None,
            Some(Vector3::new(0.0, 1.0, 1.0)),
            None,
        )
        .unwrap();
        t.set_frame(a, fa, Reference::Global).unwrap();
        t.set_frame(b, fb, Reference::Region(a)).unwrap();

        let global = FrameOfReference::from_vectors(
            Point3::new(1.0, 2.0, 3.0),
            Some(Vector3::new(0.0, 1.0, 0.0)),
            Some(Vector3::new(0.0, 0.0, 1.0)),
            None,
        )
        .unwrap();
        t.set_frame(c, global, Reference::Global).unwrap();
        let back = t.frame_in(c, Reference::Global).unwrap();
        assert!((back.origin - global.origin).norm() < TOLERANCE);
        assert!((back.basis.front() - global.basis.front()).norm() < TOLERANCE);
        assert!((back.basis.left() - global.basis.left()).norm() < TOLERANCE);

        let iso = t.absolute_isometry(c).unwrap();
        let p = Point3::new(0.3, -0.7, 2.0);
        let round = iso.inverse_transform_point(&iso.transform_point(&p));
        assert!((round - p).norm() < TOLERANCE);

        let in_b = t.frame_in(b, Reference::Region(a)).unwrap();
        assert!((in_b.origin - fb.origin).norm() < TOLERANCE);
    }

    #[test]
    fn field_references_are_not_resolved_by_the_tree() {
        let t = tree();
        let field = Reference::Field(FieldId(0));
        assert_eq!(
            t.reference_isometry(field),
            Err(SceneError::ForeignReference(field))
        );
    }

    #[test]
    fn set_origin_keeps_orientation() {
        let mut t = tree();
        let a = t.add("A", MaterialId(0)).unwrap();
        let frame = FrameOfReference::from_vectors(
            Point3::origin(),
            Some(Vector3::new(0.0, 1.0, 0.0)),
            None,
            Some(Vector3::x()),
        )
        .unwrap();
        t.set_frame(a, frame, Reference::Global).unwrap();
        t.set_origin(a, Point3::new(0.0, 0.0, 7.0), Reference::Global)
            .unwrap();
        let back = t.frame_in(a, Reference::Global).unwrap();
        assert!((back.origin - Point3::new(0.0, 0.0, 7.0)).norm() < TOLERANCE);
        assert!((back.basis.front() - Vector3::y()).norm() < TOLERANCE);
    }

    #[test]
    fn room_cannot_be_moved_or_deactivated() {
        let mut t = tree();
        assert_eq!(
            t.set_active(RegionId::ROOM, false),
            Err(SceneError::RoomImmutable("deactivated"))
        );
        assert!(
            t.set_frame(RegionId::ROOM, FrameOfReference::identity(), Reference::Global)
                .is_err()
        );
    }

    #[test]
    fn inactive_regions_expose_their_active_descendants() {
        let mut t = tree();
        let a = t.add("A", MaterialId(0)).unwrap();
        let b = t.add("B", MaterialId(0)).unwrap();
        let c = t.add("C", MaterialId(0)).unwrap();
        t.set_parent(b, a).unwrap();
        assert_eq!(t.visible_children(RegionId::ROOM).unwrap(), vec![a, c]);
        t.set_active(a, false).unwrap();
        assert_eq!(t.visible_children(RegionId::ROOM).unwrap(), vec![b, c]);
        t.set_active(b, false).unwrap();
        assert_eq!(t.visible_children(RegionId::ROOM).unwrap(), vec![c]);
    }

    #[test]
    fn scorers_are_per_region_and_idempotent_by_kind() {
        let mut t = tree();
        let a = t.add("A", MaterialId(0)).unwrap();
        t.set_voxels(a, [2, 3, 4]).unwrap();
        let s0 = t.add_scorer(a, ScorerKind::EnergyDeposit).unwrap();
        let s1 = t.add_scorer(a, ScorerKind::Dose).unwrap();
        assert_eq!(s0, ScorerId(0));
        assert_eq!(s1, ScorerId(1));
        assert_eq!(t.add_scorer(a, ScorerKind::EnergyDeposit).unwrap(), s0);
        assert_eq!(t.scorer(a, s1).unwrap().len(), 24);
        assert!(matches!(
            t.scorer(a, ScorerId(5)),
            Err(SceneError::ScorerNotFound { .. })
        ));
    }

    #[test]
    fn voxel_layout_is_locked_once_scorers_are_attached() {
        let mut t = tree();
        let a = t.add("A", MaterialId(0)).unwrap();
        t.set_voxels(a, [2, 2, 2]).unwrap();
        t.add_scorer(a, ScorerKind::Counts).unwrap();
        assert!(t.set_voxels(a, [2, 2, 2]).is_ok());
        assert!(matches!(
            t.set_voxels(a, [4, 4, 4]),
            Err(SceneError::VoxelLayoutLocked { .. })
        ));
    }

    #[test]
    fn density_map_makes_region_heterogeneous() {
        let mut t = tree();
        let a = t.add("A", MaterialId(2)).unwrap();
        assert_eq!(t.get(a).unwrap().material_id(), Some(MaterialId(2)));
        t.set_voxel_map(
            a,
            DensityMap {
                dims: [2, 1, 1],
                densities: vec![1.0, 1.5],
            },
            Vector3::new(1.0, 0.5, 0.5),
        )
        .unwrap();
        let region = t.get(a).unwrap();
        assert_eq!(region.material_id(), None);
        assert_eq!(region.voxels(), [2, 1, 1]);
        assert_eq!(t.voxel_density(a, 1, 1.0), 1.5);
    }

    #[test]
    fn rejected_voxel_map_leaves_region_untouched() {
        let mut t = tree();
        let a = t.add("A", MaterialId(2)).unwrap();
        let map = DensityMap {
            dims: [2, 1, 1],
            densities: vec![1.0, 1.5],
        };
        assert!(matches!(
            t.set_voxel_map(a, map.clone(), Vector3::new(0.0, 1.0, 1.0)),
            Err(SceneError::IllDefinedDimensions { what: "extent", .. })
        ));
        let short = DensityMap {
            dims: [3, 1, 1],
            densities: vec![1.0],
        };
        assert!(t.set_voxel_map(a, short, Vector3::repeat(1.0)).is_err());
        let region = t.get(a).unwrap();
        assert_eq!(region.material_id(), Some(MaterialId(2)));
        assert_eq!(region.voxels(), [1, 1, 1]);
        assert_eq!(region.extent(), Vector3::repeat(1.0));

        t.set_voxel_map(a, map, Vector3::new(1.0, 1.0, 2.0)).unwrap();
        let region = t.get(a).unwrap();
        assert_eq!(region.material_id(), None);
        assert_eq!(region.extent(), Vector3::new(1.0, 1.0, 2.0));
    }
}
