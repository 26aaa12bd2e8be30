//! Boundary to an external transport module.
//!
//! A module is registered as a trait object, initialized once with access to
//! the shared-buffer registry, called after the built-in modules on every
//! charged-particle step, and closed explicitly by the client.

use crate::core::models::ids::RegionId;
use crate::core::models::particle::Particle;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("No external module is registered")]
    NotRegistered,
    #[error("External module '{0}' has not been initialized")]
    NotInitialized(String),
    #[error("External module '{module}' failed to initialize: {reason}")]
    Init { module: String, reason: String },
    #[error("External module '{module}' failed to close: {reason}")]
    Close { module: String, reason: String },
    #[error("No buffer shared under '{0}'")]
    BufferNotShared(String),
}

/// Buffer exchanged between the client and an external module.
pub type SharedBuffer = Arc<RwLock<Vec<f64>>>;

/// Creates a shared buffer holding `values`.
pub fn shared_buffer(values: Vec<f64>) -> SharedBuffer {
    Arc::new(RwLock::new(values))
}

/// Named registry of shared buffers. Clones refer to the same registry.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffers {
    inner: Arc<RwLock<HashMap<String, SharedBuffer>>>,
}

impl SharedBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SharedBuffer>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SharedBuffer>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publishes `buffer` under `id`, replacing any previous buffer.
    pub fn share(&self, id: &str, buffer: SharedBuffer) {
        debug!(id, "Sharing buffer.");
        self.write().insert(id.to_string(), buffer);
    }

    pub fn obtain(&self, id: &str) -> Result<SharedBuffer, PluginError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::BufferNotShared(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}

/// State of one step as seen by an external module. Changes to `energy`,
/// `direction`, `deposit` and `kill` are applied by the tracking loop.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    pub region: RegionId,
    pub voxel: usize,
    pub particle: Particle,
    /// Global position at the end of the step.
    pub position: Point3<f64>,
    pub direction: Vector3<f64>,
    pub energy: f64,
    pub step_length: f64,
    pub deposit: f64,
    pub kill: bool,
}

pub trait ExternalModule: Send + Sync {
    fn name(&self) -> &str;

    fn init(&mut self, _buffers: &SharedBuffers) -> Result<(), String> {
        Ok(())
    }

    fn on_step(&self, step: &mut StepInfo);

    fn close(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Owner of the optional external module and its lifecycle.
#[derive(Default)]
pub struct PluginHost {
    module: Option<Box<dyn ExternalModule>>,
    initialized: bool,
    buffers: SharedBuffers,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("module", &self.module.as_ref().map(|m| m.name().to_string()))
            .field("initialized", &self.initialized)
            .field("buffers", &self.buffers.len())
            .finish()
    }
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `module`, closing any initialized predecessor first.
    pub fn register(&mut self, module: Box<dyn ExternalModule>) -> Result<(), PluginError> {
        if self.initialized {
            self.close()?;
        }
        info!(module = module.name(), "Registered external module.");
        self.module = Some(module);
        self.initialized = false;
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.module.as_ref().map(|m| m.name())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn init(&mut self) -> Result<(), PluginError> {
        let module = self.module.as_mut().ok_or(PluginError::NotRegistered)?;
        if self.initialized {
            return Ok(());
        }
        module.init(&self.buffers).map_err(|reason| PluginError::Init {
            module: module.name().to_string(),
            reason,
        })?;
        info!(module = module.name(), "Initialized external module.");
        self.initialized = true;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), PluginError> {
        let module = self.module.as_mut().ok_or(PluginError::NotRegistered)?;
        if !self.initialized {
            return Err(PluginError::NotInitialized(module.name().to_string()));
        }
        self.initialized = false;
        module.close().map_err(|reason| PluginError::Close {
            module: module.name().to_string(),
            reason,
        })?;
        info!(module = module.name(), "Closed external module.");
        Ok(())
    }

    /// Module to call during tracking; only initialized modules take part.
    pub fn active(&self) -> Option<&dyn ExternalModule> {
        if self.initialized {
            self.module.as_deref()
        } else {
            None
        }
    }

    pub fn buffers(&self) -> &SharedBuffers {
        &self.buffers
    }
}
