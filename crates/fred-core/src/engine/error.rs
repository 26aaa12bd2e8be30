use super::config::{ConfigError, ConfigFileError};
use super::plugin::PluginError;
use crate::core::frame::FrameError;
use crate::core::io::traits::VoxelMapError;
use crate::core::models::beam::BeamError;
use crate::core::models::ids::{BeamId, FieldId, MaterialId, RegionId, ScorerId};
use crate::core::models::material::MaterialLoadError;
use crate::core::models::particle::ParticleError;
use crate::core::models::ray::RayError;
use crate::core::models::scene::SceneError;
use crate::core::scoring::ScoringError;
use std::path::PathBuf;
use thiserror::Error;

/// Integer status codes of the classic C interface.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERIC_ERROR_1: i32 = -1;
    pub const GENERIC_ERROR_2: i32 = -2;
    pub const GENERIC_ERROR_3: i32 = -3;
    pub const GENERIC_ERROR_4: i32 = -4;
    pub const FILE_NOT_FOUND: i32 = -10;
    pub const IO_ERROR: i32 = -11;
    pub const ILLDEFINED_VECTOR: i32 = -50;
    pub const ILLDEFINED_DIMENSIONS: i32 = -51;
    pub const REGION_NOT_FOUND: i32 = -100;
    pub const REGION_ALREADY_DEFINED: i32 = -101;
    pub const MATERIAL_NOT_FOUND: i32 = -200;
    pub const SCORER_NOT_FOUND: i32 = -300;
}

/// Coarse classification of every failure the API can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    IllDefinedGeometry,
    InvalidParticle,
    StateViolation,
    InvalidArgument,
    Io,
    External,
}

#[derive(Debug, Error)]
pub enum FredError {
    #[error("Data directory not found: '{0}'")]
    DataDirNotFound(PathBuf),

    #[error("Region {0} not found")]
    RegionNotFound(RegionId),

    #[error("Region '{0}' is already defined")]
    RegionAlreadyDefined(String),

    #[error("Material '{0}' not found")]
    MaterialNotFound(String),

    #[error("Material {0} not found")]
    MaterialIndexNotFound(MaterialId),

    #[error("Material '{0}' is already defined")]
    MaterialAlreadyDefined(String),

    #[error("Scorer {scorer} not found in region {region}")]
    ScorerNotFound { region: RegionId, scorer: ScorerId },

    #[error("Beam {0} not found")]
    BeamNotFound(BeamId),

    #[error("Field {0} not found")]
    FieldNotFound(FieldId),

    #[error("Ill-defined frame of reference: {source}")]
    IllDefinedVector {
        #[from]
        source: FrameError,
    },

    #[error("Ill-defined {what}: {detail}")]
    IllDefinedDimensions { what: &'static str, detail: String },

    #[error("Making region {parent} the parent of region {child} would create a cycle")]
    ParentCycle { child: RegionId, parent: RegionId },

    #[error("Invalid particle: {0}")]
    InvalidParticle(String),

    #[error("Invalid rays: {source}")]
    InvalidRays {
        #[from]
        source: RayError,
    },

    #[error("Operation '{operation}' is not allowed after the setup has been closed")]
    SetupClosed { operation: &'static str },

    #[error("Operation '{operation}' is not allowed while tracking is in progress")]
    TrackingInProgress { operation: &'static str },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: '{0}'")]
    FileNotFound(PathBuf),

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid file '{path}': {message}")]
    FileFormat { path: PathBuf, message: String },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("External module error: {source}")]
    Plugin {
        #[from]
        source: PluginError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FredError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FredError::RegionNotFound(_)
            | FredError::MaterialNotFound(_)
            | FredError::MaterialIndexNotFound(_)
            | FredError::ScorerNotFound { .. }
            | FredError::BeamNotFound(_)
            | FredError::FieldNotFound(_) => ErrorKind::NotFound,
            FredError::RegionAlreadyDefined(_) | FredError::MaterialAlreadyDefined(_) => {
                ErrorKind::AlreadyExists
            }
            FredError::IllDefinedVector { .. }
            | FredError::IllDefinedDimensions { .. }
            | FredError::ParentCycle { .. } => ErrorKind::IllDefinedGeometry,
            FredError::InvalidParticle(_) | FredError::InvalidRays { .. } => {
                ErrorKind::InvalidParticle
            }
            FredError::SetupClosed { .. }
            | FredError::TrackingInProgress { .. }
            | FredError::InvalidState(_) => ErrorKind::StateViolation,
            FredError::InvalidArgument(_) | FredError::Config { .. } => ErrorKind::InvalidArgument,
            FredError::DataDirNotFound(_)
            | FredError::FileNotFound(_)
            | FredError::Io { .. }
            | FredError::FileFormat { .. } => ErrorKind::Io,
            FredError::Plugin { .. } | FredError::Internal(_) => ErrorKind::External,
        }
    }

    /// Status code of the classic C interface for this error.
    pub fn code(&self) -> i32 {
        match self {
            FredError::DataDirNotFound(_) | FredError::FileNotFound(_) => codes::FILE_NOT_FOUND,
            FredError::Io { .. } | FredError::FileFormat { .. } => codes::IO_ERROR,
            FredError::IllDefinedVector { .. } => codes::ILLDEFINED_VECTOR,
            FredError::IllDefinedDimensions { .. } | FredError::ParentCycle { .. } => {
                codes::ILLDEFINED_DIMENSIONS
            }
            FredError::RegionNotFound(_) => codes::REGION_NOT_FOUND,
            FredError::RegionAlreadyDefined(_) => codes::REGION_ALREADY_DEFINED,
            FredError::MaterialNotFound(_) | FredError::MaterialIndexNotFound(_) => {
                codes::MATERIAL_NOT_FOUND
            }
            FredError::ScorerNotFound { .. } => codes::SCORER_NOT_FOUND,
            FredError::InvalidParticle(_)
            | FredError::InvalidRays { .. }
            | FredError::BeamNotFound(_)
            | FredError::FieldNotFound(_)
            | FredError::MaterialAlreadyDefined(_) => codes::GENERIC_ERROR_1,
            FredError::SetupClosed { .. }
            | FredError::TrackingInProgress { .. }
            | FredError::InvalidState(_) => codes::GENERIC_ERROR_2,
            FredError::InvalidArgument(_) | FredError::Config { .. } => codes::GENERIC_ERROR_3,
            FredError::Plugin { .. } | FredError::Internal(_) => codes::GENERIC_ERROR_4,
        }
    }
}

impl From<SceneError> for FredError {
    fn from(e: SceneError) -> Self {
        match e {
            SceneError::RegionNotFound(id) => FredError::RegionNotFound(id),
            SceneError::RegionAlreadyDefined(name) => FredError::RegionAlreadyDefined(name),
            SceneError::IllDefinedDimensions { what, value } => FredError::IllDefinedDimensions {
                what,
                detail: format!("{value:?}"),
            },
            SceneError::ParentCycle { child, parent } => FredError::ParentCycle { child, parent },
            SceneError::RoomImmutable(what) => {
                FredError::InvalidArgument(format!("the room region cannot be {what}"))
            }
            SceneError::VoxelLayoutLocked { region, reason } => FredError::InvalidState(format!(
                "voxel layout of region {region} is locked: {reason}"
            )),
            SceneError::ScorerNotFound { region, scorer } => {
                FredError::ScorerNotFound { region, scorer }
            }
            SceneError::ForeignReference(reference) => {
                FredError::InvalidArgument(format!("{reference:?} cannot be resolved here"))
            }
            SceneError::Frame { source } => FredError::IllDefinedVector { source },
        }
    }
}

impl From<BeamError> for FredError {
    fn from(e: BeamError) -> Self {
        match e {
            BeamError::BeamNotFound(id) => FredError::BeamNotFound(id),
            BeamError::FieldNotFound(id) => FredError::FieldNotFound(id),
            foreign @ BeamError::ForeignField { .. } => FredError::InvalidArgument(foreign.to_string()),
            mismatch @ BeamError::ParticleMismatch { .. } => {
                FredError::InvalidParticle(mismatch.to_string())
            }
        }
    }
}

impl From<ParticleError> for FredError {
    fn from(e: ParticleError) -> Self {
        FredError::InvalidParticle(e.to_string())
    }
}

impl From<ScoringError> for FredError {
    fn from(e: ScoringError) -> Self {
        match e {
            ScoringError::UnknownKind(kind) => {
                FredError::InvalidArgument(format!("unknown scorer kind '{kind}'"))
            }
            ScoringError::AlreadyEvaluated => {
                FredError::InvalidState("scorer has already been evaluated".to_string())
            }
            ScoringError::BufferSizeMismatch { expected, actual } => {
                FredError::IllDefinedDimensions {
                    what: "scorer buffer",
                    detail: format!("expected {expected} values, got {actual}"),
                }
            }
        }
    }
}

impl From<MaterialLoadError> for FredError {
    fn from(e: MaterialLoadError) -> Self {
        match e {
            MaterialLoadError::Io { path, source } => {
                if source.kind() == std::io::ErrorKind::NotFound {
                    FredError::FileNotFound(path.into())
                } else {
                    FredError::Io {
                        path: path.into(),
                        source,
                    }
                }
            }
            MaterialLoadError::Toml { path, source } => FredError::FileFormat {
                path: path.into(),
                message: source.to_string(),
            },
            MaterialLoadError::AlreadyDefined(name) => FredError::MaterialAlreadyDefined(name),
            invalid @ MaterialLoadError::InvalidProperty { .. } => {
                FredError::InvalidArgument(invalid.to_string())
            }
        }
    }
}

impl From<VoxelMapError> for FredError {
    fn from(e: VoxelMapError) -> Self {
        match e {
            VoxelMapError::FileNotFound(path) => FredError::FileNotFound(path),
            VoxelMapError::Io { path, source } => FredError::Io { path, source },
            VoxelMapError::Format { path, message } => FredError::FileFormat { path, message },
        }
    }
}

impl From<ConfigFileError> for FredError {
    fn from(e: ConfigFileError) -> Self {
        match e {
            ConfigFileError::Io { path, source } => FredError::Io {
                path: path.into(),
                source,
            },
            ConfigFileError::Toml { path, source } => FredError::FileFormat {
                path: path.into(),
                message: source.to_string(),
            },
            ConfigFileError::Invalid(source) => FredError::Config { source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_errors_map_to_classic_codes() {
        let e: FredError = SceneError::RegionNotFound(RegionId(4)).into();
        assert_eq!(e.code(), codes::REGION_NOT_FOUND);
        assert_eq!(e.kind(), ErrorKind::NotFound);

        let e: FredError = SceneError::RegionAlreadyDefined("Phantom".into()).into();
        assert_eq!(e.code(), codes::REGION_ALREADY_DEFINED);
        assert_eq!(e.kind(), ErrorKind::AlreadyExists);

        let e: FredError = SceneError::ScorerNotFound {
            region: RegionId(1),
            scorer: ScorerId(3),
        }
        .into();
        assert_eq!(e.code(), codes::SCORER_NOT_FOUND);
    }

    #[test]
    fn frame_errors_are_ill_defined_vectors() {
        let e: FredError = FrameError::LeftHanded.into();
        assert_eq!(e.code(), codes::ILLDEFINED_VECTOR);
        assert_eq!(e.kind(), ErrorKind::IllDefinedGeometry);

        let e: FredError = SceneError::Frame {
            source: FrameError::LeftHanded,
        }
        .into();
        assert_eq!(e.code(), codes::ILLDEFINED_VECTOR);
    }

    #[test]
    fn missing_voxel_map_is_file_not_found() {
        let e: FredError = VoxelMapError::FileNotFound(PathBuf::from("ct.mha")).into();
        assert_eq!(e.code(), codes::FILE_NOT_FOUND);
        assert_eq!(e.kind(), ErrorKind::Io);
    }

    #[test]
    fn state_violations_share_a_kind() {
        let closed = FredError::SetupClosed {
            operation: "add_region",
        };
        let evaluated: FredError = ScoringError::AlreadyEvaluated.into();
        assert_eq!(closed.kind(), ErrorKind::StateViolation);
        assert_eq!(evaluated.kind(), ErrorKind::StateViolation);
    }
}
