use super::ids::MaterialId;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Radiation length of liquid water in cm.
pub const WATER_RADIATION_LENGTH_CM: f64 = 36.08;
pub const WATER_Z_OVER_A: f64 = 0.55508;
/// Lower clamp applied to densities derived from Hounsfield units.
pub const MIN_CT_DENSITY: f64 = 0.001;

#[derive(Debug, Error)]
pub enum MaterialLoadError {
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
    #[error("Material '{0}' is already defined")]
    AlreadyDefined(String),
    #[error("Material '{name}' has invalid {property}: {value}")]
    InvalidProperty {
        name: String,
        property: &'static str,
        value: f64,
    },
}

/// Bulk transport properties of a homogeneous medium.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Material {
    pub name: String,
    /// Mass density in g/cm³.
    pub density: f64,
    /// Stopping power relative to liquid water, per unit length.
    pub relative_stopping_power: f64,
    /// Radiation length in cm.
    pub radiation_length: f64,
    /// Mean ratio of atomic number to mass number.
    #[serde(default = "default_z_over_a")]
    pub z_over_a: f64,
}

fn default_z_over_a() -> f64 {
    0.555
}

impl Material {
    pub fn new(
        name: impl Into<String>,
        density: f64,
        relative_stopping_power: f64,
        radiation_length: f64,
        z_over_a: f64,
    ) -> Self {
        Self {
            name: name.into(),
            density,
            relative_stopping_power,
            radiation_length,
            z_over_a,
        }
    }

    /// Water-equivalent medium with the density a CT number maps to.
    pub fn water_equivalent(density: f64) -> Self {
        Self::new(
            "water-equivalent",
            density,
            density,
            WATER_RADIATION_LENGTH_CM / density,
            WATER_Z_OVER_A,
        )
    }

    pub fn is_vacuum(&self) -> bool {
        self.density <= 0.0
    }

    fn validate(&self) -> Result<(), MaterialLoadError> {
        let invalid = |property, value| MaterialLoadError::InvalidProperty {
            name: self.name.clone(),
            property,
            value,
        };
        if !self.density.is_finite() || self.density < 0.0 {
            return Err(invalid("density", self.density));
        }
        if !self.relative_stopping_power.is_finite() || self.relative_stopping_power < 0.0 {
            return Err(invalid(
                "relative-stopping-power",
                self.relative_stopping_power,
            ));
        }
        if self.radiation_length.is_nan() || self.radiation_length <= 0.0 {
            return Err(invalid("radiation-length", self.radiation_length));
        }
        Ok(())
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Material: {}", self.name)?;
        writeln!(f, "  density [g/cm^3]: {}", self.density)?;
        writeln!(f, "  relative stopping power: {}", self.relative_stopping_power)?;
        writeln!(f, "  radiation length [cm]: {}", self.radiation_length)?;
        write!(f, "  Z/A: {}", self.z_over_a)
    }
}

/// Converts a CT number to a water-equivalent density in g/cm³.
pub fn hounsfield_to_density(hu: f64) -> f64 {
    (1.0 + hu / 1000.0).max(MIN_CT_DENSITY)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MaterialFile {
    #[serde(default)]
    material: Vec<Material>,
}

/// Registry of named materials with dense, stable indices.
#[derive(Debug, Clone)]
pub struct MaterialTable {
    materials: Vec<Material>,
    by_name: HashMap<String, MaterialId>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl MaterialTable {
    pub fn empty() -> Self {
        Self {
            materials: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut table = Self::empty();
        let builtins = [
            Material::new("vacuum", 0.0, 0.0, f64::INFINITY, 0.0),
            Material::new("air", 1.205e-3, 1.07e-3, 30390.0, 0.49919),
            Material::new("water", 1.0, 1.0, WATER_RADIATION_LENGTH_CM, WATER_Z_OVER_A),
            Material::new("pmma", 1.19, 1.165, 34.07, 0.53937),
            Material::new("lung", 0.26, 0.258, 138.8, 0.54965),
            Material::new("bone", 1.85, 1.70, 14.87, 0.53010),
            Material::new("titanium", 4.54, 3.17, 3.56, 0.45961),
        ];
        for material in builtins {
            let id = MaterialId(table.materials.len());
            table.by_name.insert(material.name.clone(), id);
            table.materials.push(material);
        }
        table
    }

    /// Registers a material and returns its index.
    pub fn add(&mut self, material: Material) -> Result<MaterialId, MaterialLoadError> {
        material.validate()?;
        if self.by_name.contains_key(&material.name) {
            return Err(MaterialLoadError::AlreadyDefined(material.name));
        }
        let id = MaterialId(self.materials.len());
        self.by_name.insert(material.name.clone(), id);
        self.materials.push(material);
        Ok(id)
    }

    /// Loads additional materials from a TOML file with `[[material]]` tables.
    pub fn load_into(&mut self, path: &Path) -> Result<Vec<MaterialId>, MaterialLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| MaterialLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: MaterialFile = toml::from_str(&content).map_err(|e| MaterialLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        file.material.into_iter().map(|m| self.add(m)).collect()
    }

    pub fn index(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials
            .iter()
            .enumerate()
            .map(|(i, m)| (MaterialId(i), m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn builtin_table_resolves_standard_materials() {
        let table = MaterialTable::with_builtins();
        let water = table.index("water").unwrap();
        assert_eq!(table.get(water).unwrap().density, 1.0);
        assert!(table.index("pmma").is_some());
        assert!(table.get(table.index("vacuum").unwrap()).unwrap().is_vacuum());
        assert!(table.index("unobtainium").is_none());
    }

    #[test]
    fn adding_duplicate_material_fails() {
        let mut table = MaterialTable::with_builtins();
        let result = table.add(Material::new("water", 1.0, 1.0, 36.0, 0.55));
        assert!(matches!(result, Err(MaterialLoadError::AlreadyDefined(name)) if name == "water"));
    }

    #[test]
    fn added_material_gets_next_index() {
        let mut table = MaterialTable::with_builtins();
        let before = table.len();
        let id = table
            .add(Material::new("steel", 7.87, 5.9, 1.76, 0.466))
            .unwrap();
        assert_eq!(id, MaterialId(before));
        assert_eq!(table.index("steel"), Some(id));
    }

    #[test]
    fn negative_density_is_rejected() {
        let mut table = MaterialTable::empty();
        let result = table.add(Material::new("bad", -1.0, 1.0, 36.0, 0.5));
        assert!(matches!(
            result,
            Err(MaterialLoadError::InvalidProperty {
                property: "density",
                ..
            })
        ));
    }

    #[test]
    fn load_into_reads_material_tables() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[material]]
name = "steel"
density = 7.87
relative-stopping-power = 5.9
radiation-length = 1.76

[[material]]
name = "adipose"
density = 0.95
relative-stopping-power = 0.98
radiation-length = 41.0
z-over-a = 0.558
"#
        )
        .unwrap();

        let mut table = MaterialTable::with_builtins();
        let ids = table.load_into(file.path()).unwrap();
        assert_eq!(ids.len(), 2);
        let adipose = table.get(table.index("adipose").unwrap()).unwrap();
        assert_eq!(adipose.z_over_a, 0.558);
        assert_eq!(table.get(ids[0]).unwrap().z_over_a, 0.555);
    }

    #[test]
    fn load_into_reports_missing_file_as_io_error() {
        let mut table = MaterialTable::empty();
        let result = table.load_into(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(MaterialLoadError::Io { .. })));
    }

    #[test]
    fn hounsfield_units_map_to_clamped_density() {
        assert_eq!(hounsfield_to_density(0.0), 1.0);
        assert_eq!(hounsfield_to_density(-1000.0), MIN_CT_DENSITY);
        assert!((hounsfield_to_density(1000.0) - 2.0).abs() < 1e-12);
    }
}
