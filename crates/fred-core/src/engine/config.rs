use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_SEED_ROOT: u64 = 1_234_567_891;
pub const DEFAULT_CUTOFF_ENERGY_MEV: f64 = 1.0;
pub const DEFAULT_MAX_STEP_CM: f64 = 1.0;
pub const DEFAULT_MAX_STEPS_PER_TRACK: usize = 100_000;
pub const DEFAULT_NUCLEAR_THRESHOLD_MEV: f64 = 10.0;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// Physics processes that can be switched on and off between invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProcess {
    EnergyLoss,
    MultipleScattering,
    Straggling,
    NuclearElastic,
    NuclearInelastic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PhysicsSwitches {
    pub energy_loss: bool,
    pub multiple_scattering: bool,
    pub straggling: bool,
    pub nuclear_elastic: bool,
    pub nuclear_inelastic: bool,
}

impl Default for PhysicsSwitches {
    fn default() -> Self {
        Self {
            energy_loss: true,
            multiple_scattering: true,
            straggling: true,
            nuclear_elastic: true,
            nuclear_inelastic: true,
        }
    }
}

impl PhysicsSwitches {
    pub fn none() -> Self {
        Self {
            energy_loss: false,
            multiple_scattering: false,
            straggling: false,
            nuclear_elastic: false,
            nuclear_inelastic: false,
        }
    }

    pub fn is_enabled(&self, process: TransportProcess) -> bool {
        match process {
            TransportProcess::EnergyLoss => self.energy_loss,
            TransportProcess::MultipleScattering => self.multiple_scattering,
            TransportProcess::Straggling => self.straggling,
            TransportProcess::NuclearElastic => self.nuclear_elastic,
            TransportProcess::NuclearInelastic => self.nuclear_inelastic,
        }
    }

    pub fn set(&mut self, process: TransportProcess, enabled: bool) {
        let flag = match process {
            TransportProcess::EnergyLoss => &mut self.energy_loss,
            TransportProcess::MultipleScattering => &mut self.multiple_scattering,
            TransportProcess::Straggling => &mut self.straggling,
            TransportProcess::NuclearElastic => &mut self.nuclear_elastic,
            TransportProcess::NuclearInelastic => &mut self.nuclear_inelastic,
        };
        *flag = enabled;
    }

    /// Master switch for both nuclear channels.
    pub fn set_nuclear(&mut self, enabled: bool) {
        self.nuclear_elastic = enabled;
        self.nuclear_inelastic = enabled;
    }
}

/// Transport cuts and guards applied to every history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TrackingConfig {
    /// Kinetic energy (MeV) below which a particle deposits the rest locally.
    pub cutoff_energy: f64,
    /// Longest condensed-history step in matter (cm).
    pub max_step: f64,
    /// Step budget after which a history is aborted.
    pub max_steps_per_track: usize,
    /// Kinetic energy (MeV) below which nuclear interactions are ignored.
    pub nuclear_threshold: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            cutoff_energy: DEFAULT_CUTOFF_ENERGY_MEV,
            max_step: DEFAULT_MAX_STEP_CM,
            max_steps_per_track: DEFAULT_MAX_STEPS_PER_TRACK,
            nuclear_threshold: DEFAULT_NUCLEAR_THRESHOLD_MEV,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        TrackingConfigBuilder::new()
            .cutoff_energy(self.cutoff_energy)
            .max_step(self.max_step)
            .max_steps_per_track(self.max_steps_per_track)
            .nuclear_threshold(self.nuclear_threshold)
            .build()
            .map(|_| ())
    }
}

#[derive(Default)]
pub struct TrackingConfigBuilder {
    cutoff_energy: Option<f64>,
    max_step: Option<f64>,
    max_steps_per_track: Option<usize>,
    nuclear_threshold: Option<f64>,
}

impl TrackingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cutoff_energy(mut self, energy: f64) -> Self {
        self.cutoff_energy = Some(energy);
        self
    }
    pub fn max_step(mut self, step: f64) -> Self {
        self.max_step = Some(step);
        self
    }
    pub fn max_steps_per_track(mut self, steps: usize) -> Self {
        self.max_steps_per_track = Some(steps);
        self
    }
    pub fn nuclear_threshold(mut self, energy: f64) -> Self {
        self.nuclear_threshold = Some(energy);
        self
    }

    pub fn build(self) -> Result<TrackingConfig, ConfigError> {
        let positive = |name: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(value)
            } else {
                Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("{value} is not a finite positive number"),
                })
            }
        };
        let cutoff_energy = positive(
            "cutoff_energy",
            self.cutoff_energy
                .ok_or(ConfigError::MissingParameter("cutoff_energy"))?,
        )?;
        let max_step = positive(
            "max_step",
            self.max_step
                .ok_or(ConfigError::MissingParameter("max_step"))?,
        )?;
        let max_steps_per_track = self
            .max_steps_per_track
            .ok_or(ConfigError::MissingParameter("max_steps_per_track"))?;
        if max_steps_per_track == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_steps_per_track",
                reason: "must be at least 1".to_string(),
            });
        }
        let nuclear_threshold = self.nuclear_threshold.unwrap_or(DEFAULT_NUCLEAR_THRESHOLD_MEV);
        if !nuclear_threshold.is_finite() || nuclear_threshold < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "nuclear_threshold",
                reason: format!("{nuclear_threshold} is negative or not finite"),
            });
        }
        Ok(TrackingConfig {
            cutoff_energy,
            max_step,
            max_steps_per_track,
            nuclear_threshold,
        })
    }
}

fn default_threads() -> usize {
    1
}

fn default_seed_root() -> u64 {
    DEFAULT_SEED_ROOT
}

/// Engine settings, optionally read from `fred.toml` in the data directory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_seed_root")]
    pub seed_root: u64,
    #[serde(default)]
    pub physics: PhysicsSwitches,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            seed_root: default_seed_root(),
            physics: PhysicsSwitches::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigFileError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "threads",
                reason: "must be at least 1".to_string(),
            });
        }
        self.tracking.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn builder_requires_cuts() {
        let result = TrackingConfigBuilder::new().max_step(1.0).build();
        assert_eq!(result, Err(ConfigError::MissingParameter("cutoff_energy")));
    }

    #[test]
    fn builder_rejects_non_positive_values() {
        let result = TrackingConfigBuilder::new()
            .cutoff_energy(1.0)
            .max_step(0.0)
            .max_steps_per_track(10)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "max_step",
                ..
            })
        ));
    }

    #[test]
    fn builder_fills_default_nuclear_threshold() {
        let config = TrackingConfigBuilder::new()
            .cutoff_energy(0.5)
            .max_step(0.2)
            .max_steps_per_track(1000)
            .build()
            .unwrap();
        assert_eq!(config.nuclear_threshold, DEFAULT_NUCLEAR_THRESHOLD_MEV);
        assert_eq!(config.cutoff_energy, 0.5);
    }

    #[test]
    fn switches_toggle_individually_and_by_nuclear_master() {
        let mut switches = PhysicsSwitches::default();
        switches.set(TransportProcess::MultipleScattering, false);
        assert!(!switches.is_enabled(TransportProcess::MultipleScattering));
        assert!(switches.is_enabled(TransportProcess::EnergyLoss));
        switches.set_nuclear(false);
        assert!(!switches.nuclear_elastic && !switches.nuclear_inelastic);
    }

    #[test]
    fn load_reads_partial_kebab_case_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
threads = 4
seed-root = 42

[physics]
nuclear-inelastic = false

[tracking]
cutoff-energy = 0.5
"#
        )
        .unwrap();
        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(config.threads, 4);
        assert_eq!(config.seed_root, 42);
        assert!(!config.physics.nuclear_inelastic);
        assert!(config.physics.energy_loss);
        assert_eq!(config.tracking.cutoff_energy, 0.5);
        assert_eq!(config.tracking.max_step, DEFAULT_MAX_STEP_CM);
    }

    #[test]
    fn load_rejects_unknown_fields_and_zero_threads() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bogus = 1").unwrap();
        assert!(matches!(
            SimulationConfig::load(file.path()),
            Err(ConfigFileError::Toml { .. })
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "threads = 0").unwrap();
        assert!(matches!(
            SimulationConfig::load(file.path()),
            Err(ConfigFileError::Invalid(ConfigError::InvalidParameter {
                name: "threads",
                ..
            }))
        ));
    }
}
