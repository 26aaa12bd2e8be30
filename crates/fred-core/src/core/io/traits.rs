use super::containers::VoxelGrid;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Defines the interface for reading and writing voxel-grid file formats.
pub trait VoxelGridFile {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads a grid from a buffered reader.
    fn read_from(reader: &mut impl BufRead) -> Result<VoxelGrid, Self::Error>;

    /// Writes a grid to a writer.
    fn write_to(grid: &VoxelGrid, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads a grid from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<VoxelGrid, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes a grid to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(grid: &VoxelGrid, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(grid, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum VoxelMapError {
    #[error("File not found: '{0}'")]
    FileNotFound(PathBuf),
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("Invalid voxel map '{path}': {message}")]
    Format { path: PathBuf, message: String },
}

/// Source of Hounsfield-unit maps for heterogeneous regions.
pub trait VoxelMapLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<VoxelGrid, VoxelMapError>;
}
