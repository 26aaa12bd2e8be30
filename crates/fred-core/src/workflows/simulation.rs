use super::track::{self, WorkerPool};
use crate::core::frame::FrameOfReference;
use crate::core::io::containers::VoxelGrid;
use crate::core::io::metaimage::{MetaImageError, MetaImageFile, MetaImageLoader};
use crate::core::io::traits::{VoxelGridFile, VoxelMapLoader};
use crate::core::models::beam::{BeamStore, FieldStore};
use crate::core::models::ids::{BeamId, FieldId, MaterialId, RayId, RegionId, ScorerId};
use crate::core::models::material::{Material, MaterialTable, hounsfield_to_density};
use crate::core::models::particle::Particle;
use crate::core::models::ray::{PhaseSpace, RayStore};
use crate::core::models::region::{DensityMap, Region, RegionMaterial};
use crate::core::models::scene::{Reference, RegionTree};
use crate::core::scoring::{ScorerKind, ScorerState};
use crate::engine::config::{PhysicsSwitches, SimulationConfig, TrackingConfig, TransportProcess};
use crate::engine::context::TrackingContext;
use crate::engine::error::FredError;
use crate::engine::physics::{ModuleChain, Track};
use crate::engine::plugin::{ExternalModule, PluginHost, SharedBuffer};
use crate::engine::progress::{ProgressCallback, ProgressReporter};
use crate::engine::state::{Lifecycle, SetupState, TrackingReport, TrackingStatus};
use crate::engine::tracking::Primary;
use nalgebra::{Isometry3, Point3, Vector3};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, trace, warn};

/// Engine settings file looked up in the data directory.
pub const CONFIG_FILE_NAME: &str = "fred.toml";
/// Extra material definitions looked up in the data directory.
pub const MATERIALS_FILE_NAME: &str = "materials.toml";
/// Material of regions created by [`Simulation::add_region`].
pub const DEFAULT_REGION_MATERIAL: &str = "water";
pub const ROOM_MATERIAL: &str = "vacuum";

/// A complete simulation: scene, sources, scorers, settings and lifecycle.
///
/// All state is owned by this value; there is no process-wide instance.
pub struct Simulation {
    data_dir: PathBuf,
    config: SimulationConfig,
    materials: MaterialTable,
    regions: RegionTree,
    rays: RayStore,
    fields: FieldStore,
    beams: BeamStore,
    lifecycle: Lifecycle,
    plugins: PluginHost,
    loader: Box<dyn VoxelMapLoader>,
    workers: WorkerPool,
    progress: Option<ProgressCallback<'static>>,
    last_report: Option<TrackingReport>,
}

fn load_materials(data_dir: &Path) -> Result<MaterialTable, FredError> {
    let mut materials = MaterialTable::with_builtins();
    let path = data_dir.join(MATERIALS_FILE_NAME);
    if path.is_file() {
        let added = materials.load_into(&path)?;
        info!(count = added.len(), path = %path.display(), "Loaded extra materials.");
    }
    Ok(materials)
}

fn room_tree(materials: &MaterialTable) -> Result<RegionTree, FredError> {
    let vacuum = materials
        .index(ROOM_MATERIAL)
        .ok_or_else(|| FredError::MaterialNotFound(ROOM_MATERIAL.to_string()))?;
    Ok(RegionTree::new(vacuum))
}

/// Inclusive `first..=last` over a collection of `len`; `None` means the last element.
fn resolve_range(first: usize, last: Option<usize>, len: usize) -> Result<Range<usize>, FredError> {
    if len == 0 && first == 0 && last.is_none() {
        return Ok(0..0);
    }
    let last = last.unwrap_or(len.saturating_sub(1));
    if first > last || last >= len {
        return Err(FredError::InvalidArgument(format!(
            "range [{first}, {last}] is outside 0..{len}"
        )));
    }
    Ok(first..last + 1)
}

impl Simulation {
    /// Opens a simulation backed by `data_dir`, reading `fred.toml` and
    /// `materials.toml` from it when present.
    pub fn init(data_dir: impl AsRef<Path>) -> Result<Self, FredError> {
        let data_dir = data_dir.as_ref();
        if !data_dir.is_dir() {
            return Err(FredError::DataDirNotFound(data_dir.to_path_buf()));
        }
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        let config = if config_path.is_file() {
            debug!(path = %config_path.display(), "Reading engine settings.");
            SimulationConfig::load(&config_path)?
        } else {
            SimulationConfig::default()
        };
        Self::with_config(data_dir, config)
    }

    pub fn with_config(data_dir: impl AsRef<Path>, config: SimulationConfig) -> Result<Self, FredError> {
        let data_dir = data_dir.as_ref();
        if !data_dir.is_dir() {
            return Err(FredError::DataDirNotFound(data_dir.to_path_buf()));
        }
        config.validate()?;
        let materials = load_materials(data_dir)?;
        let regions = room_tree(&materials)?;
        let workers = WorkerPool::new(config.threads)?;
        info!(
            data_dir = %data_dir.display(),
            threads = config.threads,
            materials = materials.len(),
            "Simulation initialized."
        );
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            materials,
            regions,
            rays: RayStore::new(),
            fields: FieldStore::new(),
            beams: BeamStore::new(),
            lifecycle: Lifecycle::default(),
            plugins: PluginHost::new(),
            loader: Box::new(MetaImageLoader),
            workers,
            progress: None,
            last_report: None,
        })
    }

    /// Tears the simulation down, closing an initialized external module.
    pub fn close(mut self) -> Result<(), FredError> {
        if self.plugins.is_initialized() {
            self.plugins.close()?;
        }
        info!("Simulation closed.");
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    // --- Lifecycle ------------------------------------------------------

    pub fn setup_state(&self) -> SetupState {
        self.lifecycle.setup()
    }

    pub fn tracking_status(&self) -> TrackingStatus {
        self.lifecycle.tracking()
    }

    pub fn last_report(&self) -> Option<&TrackingReport> {
        self.last_report.as_ref()
    }

    pub fn close_setup(&mut self) -> Result<(), FredError> {
        self.lifecycle.close()?;
        info!(regions = self.regions.len(), "Setup closed.");
        Ok(())
    }

    /// Drops regions, scorers, fields, beams, rays and extra materials and reopens the setup.
    pub fn reset_all(&mut self) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("reset_all")?;
        self.materials = load_materials(&self.data_dir)?;
        self.regions = room_tree(&self.materials)?;
        self.rays.clear();
        self.fields.clear();
        self.beams.clear();
        self.lifecycle.reset();
        self.last_report = None;
        info!("Simulation reset.");
        Ok(())
    }

    /// Deletes every field together with its pencil beams. Beams outside any
    /// field and the ray store are kept.
    pub fn reset_fields(&mut self) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("reset_fields")?;
        let ids: Vec<FieldId> = self.fields.iter().map(|(id, _)| id).collect();
        let mut beams = 0;
        for field in ids {
            beams += self.beams.delete_field_members(field).len();
        }
        self.fields.clear();
        debug!(beams, "Fields cleared.");
        Ok(())
    }

    /// Drops every beam and the whole ray store.
    pub fn reset_beams(&mut self) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("reset_beams")?;
        self.beams.clear();
        self.rays.clear();
        debug!("Beams and rays cleared.");
        Ok(())
    }

    /// Empties the ray store and every beam's ray list.
    pub fn reset_rays(&mut self) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("reset_rays")?;
        self.rays.clear();
        self.beams.clear_rays();
        debug!("Rays cleared.");
        Ok(())
    }

    // --- Settings -------------------------------------------------------

    pub fn threads(&self) -> usize {
        self.workers.threads()
    }

    pub fn set_threads(&mut self, threads: usize) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_threads")?;
        if threads == self.workers.threads() {
            return Ok(());
        }
        self.workers = WorkerPool::new(threads)?;
        self.config.threads = threads;
        info!(threads, "Worker count changed.");
        Ok(())
    }

    pub fn available_threads() -> usize {
        track::available_threads()
    }

    pub fn seed_root(&self) -> u64 {
        self.config.seed_root
    }

    pub fn set_seed_root(&mut self, seed: u64) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_seed_root")?;
        self.config.seed_root = seed;
        debug!(seed, "Seed root set.");
        Ok(())
    }

    pub fn physics(&self) -> PhysicsSwitches {
        self.config.physics
    }

    pub fn set_physics(&mut self, switches: PhysicsSwitches) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_physics")?;
        self.config.physics = switches;
        debug!(?switches, "Physics switches replaced.");
        Ok(())
    }

    pub fn activate(&mut self, process: TransportProcess, enabled: bool) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("activate")?;
        self.config.physics.set(process, enabled);
        debug!(?process, enabled, "Physics switch toggled.");
        Ok(())
    }

    /// Switches both nuclear channels at once.
    pub fn activate_nuclear(&mut self, enabled: bool) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("activate_nuclear")?;
        self.config.physics.set_nuclear(enabled);
        debug!(enabled, "Nuclear interactions toggled.");
        Ok(())
    }

    pub fn tracking_config(&self) -> &TrackingConfig {
        &self.config.tracking
    }

    pub fn set_tracking_config(&mut self, config: TrackingConfig) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_tracking_config")?;
        config.validate()?;
        self.config.tracking = config;
        Ok(())
    }

    pub fn set_progress_callback(&mut self, callback: Option<ProgressCallback<'static>>) {
        self.progress = callback;
    }

    // --- Regions --------------------------------------------------------

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn region_index(&self, name: &str) -> Option<RegionId> {
        self.regions.index(name)
    }

    pub fn region(&self, id: RegionId) -> Result<&Region, FredError> {
        Ok(self.regions.get(id)?)
    }

    /// Adds a unit water cube as a child of the room.
    pub fn add_region(&mut self, name: &str) -> Result<RegionId, FredError> {
        self.lifecycle.ensure_open("add_region")?;
        let water = self
            .materials
            .index(DEFAULT_REGION_MATERIAL)
            .ok_or_else(|| FredError::MaterialNotFound(DEFAULT_REGION_MATERIAL.to_string()))?;
        let id = self.regions.add(name, water)?;
        debug!(%id, name, "Region added.");
        Ok(id)
    }

    pub fn region_extent(&self, id: RegionId) -> Result<Vector3<f64>, FredError> {
        Ok(self.regions.get(id)?.extent())
    }

    pub fn set_region_extent(&mut self, id: RegionId, extent: Vector3<f64>) -> Result<(), FredError> {
        self.lifecycle.ensure_open("set_region_extent")?;
        self.regions.set_extent(id, extent)?;
        Ok(())
    }

    pub fn region_pivot(&self, id: RegionId) -> Result<Vector3<f64>, FredError> {
        Ok(self.regions.get(id)?.pivot())
    }

    pub fn set_region_pivot(&mut self, id: RegionId, pivot: Vector3<f64>) -> Result<(), FredError> {
        self.lifecycle.ensure_open("set_region_pivot")?;
        self.regions.set_pivot(id, pivot)?;
        Ok(())
    }

    pub fn region_voxels(&self, id: RegionId) -> Result<[usize; 3], FredError> {
        Ok(self.regions.get(id)?.voxels())
    }

    pub fn set_region_voxels(&mut self, id: RegionId, voxels: [usize; 3]) -> Result<(), FredError> {
        self.lifecycle.ensure_open("set_region_voxels")?;
        self.regions.set_voxels(id, voxels)?;
        Ok(())
    }

    pub fn region_origin(&self, id: RegionId, reference: Reference) -> Result<Point3<f64>, FredError> {
        Ok(self.region_frame(id, reference)?.origin)
    }

    pub fn set_region_origin(
        &mut self,
        id: RegionId,
        origin: Point3<f64>,
        reference: Reference,
    ) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_region_origin")?;
        let (origin, reference) = match reference {
            Reference::Field(field) => (self.fields.isometry(field)? * origin, Reference::Global),
            _ => (origin, reference),
        };
        self.regions.set_origin(id, origin, reference)?;
        Ok(())
    }

    pub fn region_frame(&self, id: RegionId, reference: Reference) -> Result<FrameOfReference, FredError> {
        match reference {
            Reference::Field(field) => {
                let absolute = self.regions.absolute_isometry(id)?;
                let field = self.fields.isometry(field)?;
                Ok(FrameOfReference::from_isometry(&(field.inverse() * absolute)))
            }
            _ => Ok(self.regions.frame_in(id, reference)?),
        }
    }

    pub fn set_region_frame(
        &mut self,
        id: RegionId,
        frame: FrameOfReference,
        reference: Reference,
    ) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_region_frame")?;
        let (frame, scene_reference) = match reference {
            Reference::Field(field) => {
                let global = self.fields.isometry(field)? * frame.to_isometry();
                (FrameOfReference::from_isometry(&global), Reference::Global)
            }
            _ => (frame, reference),
        };
        self.regions.set_frame(id, frame, scene_reference)?;
        debug!(%id, ?reference, "Region frame set.");
        Ok(())
    }

    /// Single material of the region; `None` when it is voxelized.
    pub fn region_material(&self, id: RegionId) -> Result<Option<MaterialId>, FredError> {
        Ok(self.regions.get(id)?.material_id())
    }

    pub fn set_region_material(&mut self, id: RegionId, material: MaterialId) -> Result<(), FredError> {
        self.lifecycle.ensure_open("set_region_material")?;
        self.material(material)?;
        self.regions.set_material(id, material)?;
        Ok(())
    }

    pub fn region_parent(&self, id: RegionId) -> Result<Option<RegionId>, FredError> {
        Ok(self.regions.get(id)?.parent())
    }

    pub fn set_region_parent(&mut self, child: RegionId, parent: RegionId) -> Result<(), FredError> {
        self.lifecycle.ensure_open("set_region_parent")?;
        self.regions.set_parent(child, parent)?;
        debug!(%child, %parent, "Region re-parented.");
        Ok(())
    }

    pub fn is_region_active(&self, id: RegionId) -> Result<bool, FredError> {
        Ok(self.regions.get(id)?.is_active())
    }

    pub fn set_region_active(&mut self, id: RegionId, active: bool) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_region_active")?;
        self.regions.set_active(id, active)?;
        debug!(%id, active, "Region activation changed.");
        Ok(())
    }

    /// Maps a point from the region's local frame to global coordinates.
    pub fn region_to_global(&self, id: RegionId, local: &Point3<f64>) -> Result<Point3<f64>, FredError> {
        Ok(self.regions.absolute_isometry(id)? * local)
    }

    pub fn global_to_region(&self, id: RegionId, global: &Point3<f64>) -> Result<Point3<f64>, FredError> {
        Ok(self.regions.absolute_isometry(id)?.inverse_transform_point(global))
    }

    /// Rotates a free vector from the region's frame into the global frame.
    pub fn region_vector_to_global(
        &self,
        id: RegionId,
        local: &Vector3<f64>,
    ) -> Result<Vector3<f64>, FredError> {
        Ok(self.regions.absolute_isometry(id)?.transform_vector(local))
    }

    pub fn global_vector_to_region(
        &self,
        id: RegionId,
        global: &Vector3<f64>,
    ) -> Result<Vector3<f64>, FredError> {
        Ok(self
            .regions
            .absolute_isometry(id)?
            .inverse_transform_vector(global))
    }

    pub fn set_voxel_map_loader(&mut self, loader: Box<dyn VoxelMapLoader>) {
        self.loader = loader;
    }

    /// Fills the region from a CT scan: Hounsfield units become water-equivalent
    /// densities and the region adopts the scan's extent and voxel counts.
    #[instrument(skip_all, name = "load_ct_scan", fields(region = %id))]
    pub fn load_region_ct_scan(&mut self, id: RegionId, path: impl AsRef<Path>) -> Result<(), FredError> {
        self.lifecycle.ensure_open("load_region_ct_scan")?;
        self.regions.get(id)?;
        let path = path.as_ref();
        let grid = self.loader.load(path)?;
        if grid.data.len() != grid.num_voxels() {
            return Err(FredError::FileFormat {
                path: path.to_path_buf(),
                message: format!(
                    "{} values for {} voxels",
                    grid.data.len(),
                    grid.num_voxels()
                ),
            });
        }
        let densities = grid
            .data
            .iter()
            .map(|hu| hounsfield_to_density(*hu as f64))
            .collect();
        self.regions.set_voxel_map(
            id,
            DensityMap {
                dims: grid.dims,
                densities,
            },
            grid.extent(),
        )?;
        info!(dims = ?grid.dims, path = %path.display(), "CT scan loaded.");
        Ok(())
    }

    /// Human-readable summary of a region, also written to the log.
    pub fn region_info(&self, id: RegionId) -> Result<String, FredError> {
        let region = self.regions.get(id)?;
        let frame = self.regions.frame_in(id, Reference::Global)?;
        let e = region.extent();
        let p = region.pivot();
        let v = region.voxels();
        let o = frame.origin;
        let parent = region
            .parent()
            .map_or_else(|| "none".to_string(), |parent| parent.to_string());
        let material = match region.material() {
            RegionMaterial::Homogeneous(material) => self
                .material(*material)
                .map_or("?", |m| m.name.as_str())
                .to_string(),
            RegionMaterial::Heterogeneous(_) => "voxel map".to_string(),
        };
        let kinds: Vec<&str> = region.scorers().iter().map(|s| s.kind().name()).collect();

        let mut lines = vec![
            format!("Region {id}: {}", region.name()),
            format!("  parent: {parent}"),
            format!("  extent [cm]: {} {} {}", e.x, e.y, e.z),
            format!("  pivot: {} {} {}", p.x, p.y, p.z),
            format!("  voxels: {} {} {}", v[0], v[1], v[2]),
            format!("  origin (global) [cm]: {} {} {}", o.x, o.y, o.z),
        ];
        for (axis, vector) in [
            ("front", frame.basis.front()),
            ("up", frame.basis.up()),
            ("left", frame.basis.left()),
        ] {
            lines.push(format!("  {axis}: {} {} {}", vector.x, vector.y, vector.z));
        }
        lines.push(format!("  material: {material}"));
        lines.push(format!("  active: {}", region.is_active()));
        lines.push(format!("  scorers: [{}]", kinds.join(", ")));
        let out = lines.join("\n");
        info!("{out}");
        Ok(out)
    }

    // --- Materials ------------------------------------------------------

    pub fn num_materials(&self) -> usize {
        self.materials.len()
    }

    pub fn material_index(&self, name: &str) -> Option<MaterialId> {
        self.materials.index(name)
    }

    pub fn material(&self, id: MaterialId) -> Result<&Material, FredError> {
        self.materials
            .get(id)
            .ok_or(FredError::MaterialIndexNotFound(id))
    }

    pub fn material_info(&self, id: MaterialId) -> Result<String, FredError> {
        let info = self.material(id)?.to_string();
        info!("{info}");
        Ok(info)
    }

    pub fn add_material(&mut self, material: Material) -> Result<MaterialId, FredError> {
        self.lifecycle.ensure_open("add_material")?;
        let name = material.name.clone();
        let id = self.materials.add(material)?;
        debug!(%id, name, "Material added.");
        Ok(id)
    }

    // --- Scorers --------------------------------------------------------

    pub fn add_scorer(&mut self, region: RegionId, kind: ScorerKind) -> Result<ScorerId, FredError> {
        self.lifecycle.ensure_open("add_scorer")?;
        let id = self.regions.add_scorer(region, kind)?;
        debug!(%region, %id, %kind, "Scorer attached.");
        Ok(id)
    }

    pub fn scorer_index(&self, region: RegionId, kind: ScorerKind) -> Result<Option<ScorerId>, FredError> {
        Ok(self
            .regions
            .get(region)?
            .scorers()
            .iter()
            .position(|s| s.kind() == kind)
            .map(ScorerId))
    }

    pub fn scorer_state(&self, region: RegionId, scorer: ScorerId) -> Result<ScorerState, FredError> {
        Ok(self.regions.scorer(region, scorer)?.state())
    }

    pub fn reset_scorer(&mut self, region: RegionId, scorer: ScorerId) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("reset_scorer")?;
        self.regions.scorer_mut(region, scorer)?.reset();
        Ok(())
    }

    pub fn reset_all_scorers(&mut self) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("reset_all_scorers")?;
        let targets: Vec<(RegionId, usize)> = self
            .regions
            .iter()
            .map(|(id, region)| (id, region.scorers().len()))
            .collect();
        for (region, count) in targets {
            for scorer in 0..count {
                self.regions.scorer_mut(region, ScorerId(scorer))?.reset();
            }
        }
        Ok(())
    }

    /// Converts the raw sums of a scorer into physical units.
    pub fn evaluate_scorer(&mut self, region: RegionId, scorer: ScorerId) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("evaluate_scorer")?;
        let r = self.regions.get(region)?;
        let voxel_volume = r.grid().voxel_volume();
        let material_density = match r.material_id() {
            Some(id) => self.material(id)?.density,
            None => 0.0,
        };
        let densities: Vec<f64> = (0..r.num_voxels())
            .map(|voxel| self.regions.voxel_density(region, voxel, material_density))
            .collect();
        self.regions
            .scorer_mut(region, scorer)?
            .evaluate(voxel_volume, |voxel| densities[voxel])?;
        debug!(%region, %scorer, "Scorer evaluated.");
        Ok(())
    }

    /// Writes the scorer as a MetaImage file placed in the global frame and
    /// returns the path written. `.mha` is appended when `path` has no extension.
    pub fn save_scorer(
        &mut self,
        region: RegionId,
        scorer: ScorerId,
        path: impl AsRef<Path>,
    ) -> Result<PathBuf, FredError> {
        self.lifecycle.ensure_idle("save_scorer")?;
        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            path.set_extension("mha");
        }
        let grid = self.scorer_grid(region, scorer)?;
        MetaImageFile::write_to_path(&grid, &path).map_err(|e| match e {
            MetaImageError::Io(source) => FredError::Io {
                path: path.clone(),
                source,
            },
            other => FredError::FileFormat {
                path: path.clone(),
                message: other.to_string(),
            },
        })?;
        self.regions.scorer_mut(region, scorer)?.mark_exported();
        info!(%region, %scorer, path = %path.display(), "Scorer saved.");
        Ok(path)
    }

    fn scorer_grid(&self, region: RegionId, scorer: ScorerId) -> Result<VoxelGrid, FredError> {
        let r = self.regions.get(region)?;
        let values = self.regions.scorer(region, scorer)?.values();
        let iso = self.regions.absolute_isometry(region)?;
        let grid = r.grid();
        let mut out = VoxelGrid::new(
            grid.dims,
            grid.voxel_size(),
            values.iter().map(|v| *v as f32).collect(),
        );
        out.axes = iso.rotation.to_rotation_matrix().into_inner();
        out.offset = iso * grid.voxel_centre(0);
        Ok(out)
    }

    /// Copies the published scorer values into `buffer`, which must hold
    /// exactly one value per voxel.
    pub fn read_scorer_buffer(
        &self,
        region: RegionId,
        scorer: ScorerId,
        buffer: &mut [f64],
    ) -> Result<(), FredError> {
        self.regions.scorer(region, scorer)?.copy_into(buffer)?;
        Ok(())
    }

    pub fn scorer_buffer(&self, region: RegionId, scorer: ScorerId) -> Result<Vec<f64>, FredError> {
        Ok(self.regions.scorer(region, scorer)?.values().to_vec())
    }

    // --- Rays and beams -------------------------------------------------

    pub fn num_rays(&self) -> usize {
        self.rays.len()
    }

    /// Number of live beams; deleted beams are not counted.
    pub fn num_beams(&self) -> usize {
        self.beams.count()
    }

    pub fn num_beam_rays(&self, beam: BeamId) -> Result<usize, FredError> {
        Ok(self.beams.get(beam)?.rays().len())
    }

    /// Validates a batch of rays without storing it.
    pub fn check_rays(&self, particle: Particle, rays: &[PhaseSpace]) -> Result<(), FredError> {
        RayStore::check(rays)?;
        trace!(count = rays.len(), %particle, "Ray batch checked.");
        Ok(())
    }

    /// Stores a batch of rays in global coordinates; all or none are accepted.
    pub fn add_rays(&mut self, particle: Particle, rays: &[PhaseSpace]) -> Result<Range<RayId>, FredError> {
        self.lifecycle.ensure_idle("add_rays")?;
        let range = self.rays.add(particle, rays, None)?;
        debug!(count = range.len(), %particle, "Rays added.");
        Ok(RayId(range.start)..RayId(range.end))
    }

    pub fn add_beam(&mut self) -> Result<BeamId, FredError> {
        self.lifecycle.ensure_idle("add_beam")?;
        let id = self.beams.add(None);
        debug!(%id, "Beam added.");
        Ok(id)
    }

    /// Adds a pencil beam to `field`, initially placed at the field's frame.
    pub fn add_field_beam(&mut self, field: FieldId) -> Result<BeamId, FredError> {
        self.lifecycle.ensure_idle("add_field_beam")?;
        self.fields.get(field)?;
        let id = self.beams.add(Some(field));
        debug!(%id, %field, "Pencil beam added.");
        Ok(id)
    }

    pub fn beam_field(&self, beam: BeamId) -> Result<Option<FieldId>, FredError> {
        Ok(self.beams.get(beam)?.field())
    }

    /// Deletes one beam. Its rays stay in the ray store but are no longer
    /// transported; other beam ids are unaffected.
    pub fn delete_beam(&mut self, beam: BeamId) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("delete_beam")?;
        let deleted = self.beams.delete(beam)?;
        debug!(%beam, rays = deleted.rays().len(), "Beam deleted.");
        Ok(())
    }

    pub fn set_beam_frame(
        &mut self,
        beam: BeamId,
        frame: FrameOfReference,
        reference: Reference,
    ) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_beam_frame")?;
        match reference {
            Reference::Region(region) => {
                self.regions.get(region)?;
            }
            Reference::Field(field) => {
                self.fields.get(field)?;
            }
            Reference::Global => {}
        }
        self.beams.set_placement(beam, frame, reference)?;
        debug!(%beam, ?reference, "Beam frame set.");
        Ok(())
    }

    /// Beam frame expressed in `reference`.
    pub fn beam_frame(&self, beam: BeamId, reference: Reference) -> Result<FrameOfReference, FredError> {
        let absolute = self.beam_isometry(beam)?;
        let reference = self.reference_isometry(reference)?;
        Ok(FrameOfReference::from_isometry(&(reference.inverse() * absolute)))
    }

    fn beam_isometry(&self, beam: BeamId) -> Result<Isometry3<f64>, FredError> {
        let beam = self.beams.get(beam)?;
        Ok(self.reference_isometry(beam.reference())? * beam.frame().to_isometry())
    }

    fn reference_isometry(&self, reference: Reference) -> Result<Isometry3<f64>, FredError> {
        match reference {
            Reference::Field(field) => Ok(self.fields.isometry(field)?),
            _ => Ok(self.regions.reference_isometry(reference)?),
        }
    }

    // --- Fields ---------------------------------------------------------

    pub fn num_fields(&self) -> usize {
        self.fields.count()
    }

    pub fn add_field(&mut self) -> Result<FieldId, FredError> {
        self.lifecycle.ensure_idle("add_field")?;
        let id = self.fields.add();
        debug!(%id, "Field added.");
        Ok(id)
    }

    /// Deletes a field and every pencil beam it holds.
    pub fn delete_field(&mut self, field: FieldId) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("delete_field")?;
        self.fields.delete(field)?;
        let beams = self.beams.delete_field_members(field);
        debug!(%field, beams = beams.len(), "Field deleted.");
        Ok(())
    }

    /// Field frame in global coordinates.
    pub fn field_frame(&self, field: FieldId) -> Result<FrameOfReference, FredError> {
        Ok(*self.fields.get(field)?.frame())
    }

    /// Moves a field; its pencil beams placed relative to it move along.
    pub fn set_field_frame(&mut self, field: FieldId, frame: FrameOfReference) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("set_field_frame")?;
        self.fields.set_frame(field, frame)?;
        debug!(%field, "Field frame set.");
        Ok(())
    }

    /// Stores rays given in the beam frame and appends them to the beam.
    pub fn add_beam_rays(
        &mut self,
        beam: BeamId,
        particle: Particle,
        rays: &[PhaseSpace],
    ) -> Result<Range<RayId>, FredError> {
        self.lifecycle.ensure_idle("add_beam_rays")?;
        self.beams.check_particle(beam, particle)?;
        let range = self.rays.add(particle, rays, Some(beam))?;
        self.beams
            .attach_rays(beam, particle, range.clone().map(RayId))?;
        debug!(%beam, count = range.len(), %particle, "Beam rays added.");
        Ok(RayId(range.start)..RayId(range.end))
    }

    // --- External module ------------------------------------------------

    pub fn register_plugin(&mut self, module: Box<dyn ExternalModule>) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("register_plugin")?;
        self.plugins.register(module)?;
        Ok(())
    }

    pub fn init_plugin(&mut self) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("init_plugin")?;
        self.plugins.init()?;
        Ok(())
    }

    pub fn close_plugin(&mut self) -> Result<(), FredError> {
        self.lifecycle.ensure_idle("close_plugin")?;
        self.plugins.close()?;
        Ok(())
    }

    pub fn share_buffer(&self, id: &str, buffer: SharedBuffer) {
        self.plugins.buffers().share(id, buffer);
    }

    pub fn obtain_buffer(&self, id: &str) -> Result<SharedBuffer, FredError> {
        Ok(self.plugins.buffers().obtain(id)?)
    }

    // --- Tracking -------------------------------------------------------

    /// Tracks rays `first..=last` of the ray store; `last = None` runs to the end.
    pub fn track_rays(&mut self, first: usize, last: Option<usize>) -> Result<TrackingReport, FredError> {
        self.lifecycle.ensure_idle("track_rays")?;
        let range = resolve_range(first, last, self.rays.len())?;
        let primaries = self.primaries(range.map(RayId))?;
        self.track(primaries)
    }

    /// Tracks every ray of beams `first..=last`, beam by beam. Indices of
    /// deleted beams inside the range are skipped.
    pub fn track_beams(&mut self, first: usize, last: Option<usize>) -> Result<TrackingReport, FredError> {
        self.lifecycle.ensure_idle("track_beams")?;
        let range = resolve_range(first, last, self.beams.len())?;
        let mut ids = Vec::new();
        for beam in range {
            if let Ok(beam) = self.beams.get(BeamId(beam)) {
                ids.extend_from_slice(beam.rays());
            }
        }
        let primaries = self.primaries(ids.into_iter())?;
        self.track(primaries)
    }

    fn primaries(&self, ids: impl Iterator<Item = RayId>) -> Result<Vec<Primary>, FredError> {
        let mut placements: Vec<Option<Isometry3<f64>>> = vec![None; self.beams.len()];
        let mut primaries = Vec::new();
        let mut orphaned = 0usize;
        for id in ids {
            let ray = self
                .rays
                .get(id)
                .ok_or_else(|| FredError::Internal(format!("ray {id} is missing")))?;
            let (position, direction) = match ray.beam {
                Some(beam) if !self.beams.contains(beam) => {
                    orphaned += 1;
                    continue;
                }
                Some(beam) => {
                    let iso = match placements.get(beam.index()).copied().flatten() {
                        Some(iso) => iso,
                        None => {
                            let iso = self.beam_isometry(beam)?;
                            if let Some(slot) = placements.get_mut(beam.index()) {
                                *slot = Some(iso);
                            }
                            iso
                        }
                    };
                    (iso * ray.position, iso * ray.direction)
                }
                None => (ray.position, ray.direction),
            };
            primaries.push(Primary {
                index: id.index() as u64,
                track: Track::new(ray.particle, position, direction, ray.energy),
            });
        }
        if orphaned > 0 {
            debug!(orphaned, "Skipped rays of deleted beams.");
        }
        Ok(primaries)
    }

    fn track(&mut self, primaries: Vec<Primary>) -> Result<TrackingReport, FredError> {
        if self.lifecycle.setup() == SetupState::Open {
            info!("Closing setup before the first tracking invocation.");
        }
        self.lifecycle.begin_tracking()?;
        let result = self.run_tracking(&primaries);
        self.lifecycle.finish_tracking(result.is_ok());
        match &result {
            Ok(report) => self.last_report = Some(report.clone()),
            Err(e) => warn!(error = %e, "Tracking invocation failed."),
        }
        result
    }

    fn run_tracking(&mut self, primaries: &[Primary]) -> Result<TrackingReport, FredError> {
        let chain = ModuleChain::new(self.config.physics, &self.config.tracking);
        let ctx = TrackingContext::resolve(
            &self.regions,
            &self.materials,
            chain,
            self.config.tracking.clone(),
            self.config.seed_root,
            self.plugins.active(),
        )?;
        let reporter = match &self.progress {
            Some(callback) => ProgressReporter::with_callback(Box::new(move |event| callback(event))),
            None => ProgressReporter::new(),
        };
        let outcome = track::run(&ctx, primaries, &self.workers, &reporter);
        let slots = ctx.slots.clone();
        drop(ctx);

        for (index, (slot, buffer)) in slots.iter().zip(outcome.tally.buffers()).enumerate() {
            if !outcome.tally.is_hit(index) {
                continue;
            }
            self.regions
                .scorer_mut(slot.region, slot.scorer)?
                .accumulate(buffer);
        }
        Ok(outcome.report)
    }
}
