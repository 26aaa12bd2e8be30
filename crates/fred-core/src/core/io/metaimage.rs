use super::containers::VoxelGrid;
use super::traits::{VoxelGridFile, VoxelMapError, VoxelMapLoader};
use nalgebra::{Matrix3, Point3, Vector3};
use std::collections::HashMap;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaImageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Missing header field: {0}")]
    MissingField(&'static str),
    #[error("Invalid value for {key}: '{value}'")]
    InvalidField { key: String, value: String },
    #[error("Unsupported MetaImage feature: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementType {
    Short,
    Int,
    Float,
    Double,
}

impl ElementType {
    fn parse(value: &str) -> Result<Self, MetaImageError> {
        match value {
            "MET_SHORT" => Ok(ElementType::Short),
            "MET_INT" => Ok(ElementType::Int),
            "MET_FLOAT" => Ok(ElementType::Float),
            "MET_DOUBLE" => Ok(ElementType::Double),
            other => Err(MetaImageError::Unsupported(format!("element type {other}"))),
        }
    }

    fn size(self) -> usize {
        match self {
            ElementType::Short => 2,
            ElementType::Int | ElementType::Float => 4,
            ElementType::Double => 8,
        }
    }

    fn decode(self, bytes: &[u8], big_endian: bool) -> f32 {
        macro_rules! decode_as {
            ($t:ty, $n:literal) => {{
                let mut raw = [0u8; $n];
                raw.copy_from_slice(bytes);
                if big_endian {
                    <$t>::from_be_bytes(raw)
                } else {
                    <$t>::from_le_bytes(raw)
                }
            }};
        }
        match self {
            ElementType::Short => decode_as!(i16, 2) as f32,
            ElementType::Int => decode_as!(i32, 4) as f32,
            ElementType::Float => decode_as!(f32, 4),
            ElementType::Double => decode_as!(f64, 8) as f32,
        }
    }
}

/// Single-file MetaImage (`.mha`) with an ASCII header and inline binary data.
pub struct MetaImageFile;

fn parse_floats<const N: usize>(
    header: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<[f64; N]>, MetaImageError> {
    let Some(value) = header.get(key) else {
        return Ok(None);
    };
    let invalid = || MetaImageError::InvalidField {
        key: key.to_string(),
        value: value.clone(),
    };
    let parsed: Vec<f64> = value
        .split_whitespace()
        .map(|t| t.parse::<f64>().map_err(|_| invalid()))
        .collect::<Result<_, _>>()?;
    let array: [f64; N] = parsed.try_into().map_err(|_| invalid())?;
    Ok(Some(array))
}

fn parse_bool(header: &HashMap<String, String>, key: &str) -> bool {
    header
        .get(key)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

impl VoxelGridFile for MetaImageFile {
    type Error = MetaImageError;

    fn read_from(reader: &mut impl BufRead) -> Result<VoxelGrid, Self::Error> {
        let mut header = HashMap::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Err(MetaImageError::MissingField("ElementDataFile"));
            }
            let text = String::from_utf8_lossy(&line);
            let Some((key, value)) = text.split_once('=') else {
                continue;
            };
            let key = key.trim().to_string();
            let value = value.trim().to_string();
            if key == "ElementDataFile" {
                if value != "LOCAL" {
                    return Err(MetaImageError::Unsupported(format!(
                        "detached data file '{value}'"
                    )));
                }
                break;
            }
            header.insert(key, value);
        }

        if let Some(ndims) = header.get("NDims") {
            if ndims != "3" {
                return Err(MetaImageError::Unsupported(format!("NDims = {ndims}")));
            }
        }
        if parse_bool(&header, "CompressedData") {
            return Err(MetaImageError::Unsupported("compressed data".to_string()));
        }
        let big_endian = parse_bool(&header, "BinaryDataByteOrderMSB")
            || parse_bool(&header, "ElementByteOrderMSB");

        let dims = parse_floats::<3>(&header, "DimSize")?
            .ok_or(MetaImageError::MissingField("DimSize"))?;
        if dims.iter().any(|d| *d < 1.0 || d.fract() != 0.0) {
            return Err(MetaImageError::InvalidField {
                key: "DimSize".to_string(),
                value: format!("{dims:?}"),
            });
        }
        let dims = dims.map(|d| d as usize);
        let spacing = parse_floats::<3>(&header, "ElementSpacing")?
            .or(parse_floats::<3>(&header, "ElementSize")?)
            .unwrap_or([1.0; 3]);
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(MetaImageError::InvalidField {
                key: "ElementSpacing".to_string(),
                value: format!("{spacing:?}"),
            });
        }
        let offset = parse_floats::<3>(&header, "Offset")?
            .or(parse_floats::<3>(&header, "Position")?)
            .unwrap_or([0.0; 3]);
        let axes = parse_floats::<9>(&header, "TransformMatrix")?
            .map(|m| Matrix3::from_column_slice(&m))
            .unwrap_or_else(Matrix3::identity);
        let element = ElementType::parse(
            header
                .get("ElementType")
                .ok_or(MetaImageError::MissingField("ElementType"))?,
        )?;

        let byte_len = dims
            .iter()
            .try_fold(element.size(), |n, d| n.checked_mul(*d))
            .ok_or_else(|| MetaImageError::InvalidField {
                key: "DimSize".to_string(),
                value: format!("{dims:?}"),
            })?;
        // Grows with the bytes actually present rather than the header's claim.
        let mut bytes = Vec::new();
        reader.by_ref().take(byte_len as u64).read_to_end(&mut bytes)?;
        if bytes.len() < byte_len {
            return Err(MetaImageError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {byte_len} data bytes, found {}", bytes.len()),
            )));
        }
        let data = bytes
            .chunks_exact(element.size())
            .map(|chunk| element.decode(chunk, big_endian))
            .collect();

        Ok(VoxelGrid {
            dims,
            spacing: Vector3::from(spacing),
            offset: Point3::from(offset),
            axes,
            data,
        })
    }

    fn write_to(grid: &VoxelGrid, writer: &mut impl Write) -> Result<(), Self::Error> {
        let m = &grid.axes;
        writeln!(writer, "ObjectType = Image")?;
        writeln!(writer, "NDims = 3")?;
        writeln!(writer, "BinaryData = True")?;
        writeln!(writer, "BinaryDataByteOrderMSB = False")?;
        writeln!(writer, "CompressedData = False")?;
        writeln!(
            writer,
            "TransformMatrix = {} {} {} {} {} {} {} {} {}",
            m[(0, 0)],
            m[(1, 0)],
            m[(2, 0)],
            m[(0, 1)],
            m[(1, 1)],
            m[(2, 1)],
            m[(0, 2)],
            m[(1, 2)],
            m[(2, 2)]
        )?;
        writeln!(
            writer,
            "Offset = {} {} {}",
            grid.offset.x, grid.offset.y, grid.offset.z
        )?;
        writeln!(
            writer,
            "ElementSpacing = {} {} {}",
            grid.spacing.x, grid.spacing.y, grid.spacing.z
        )?;
        writeln!(
            writer,
            "DimSize = {} {} {}",
            grid.dims[0], grid.dims[1], grid.dims[2]
        )?;
        writeln!(writer, "ElementType = MET_FLOAT")?;
        writeln!(writer, "ElementDataFile = LOCAL")?;
        for value in &grid.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Default voxel-map loader reading MetaImage files.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetaImageLoader;

impl VoxelMapLoader for MetaImageLoader {
    fn load(&self, path: &Path) -> Result<VoxelGrid, VoxelMapError> {
        if !path.is_file() {
            return Err(VoxelMapError::FileNotFound(path.to_path_buf()));
        }
        MetaImageFile::read_from_path(path).map_err(|e| match e {
            MetaImageError::Io(source) => VoxelMapError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => VoxelMapError::Format {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};
    use tempfile::tempdir;

    fn sample_grid() -> VoxelGrid {
        let mut grid = VoxelGrid::new(
            [2, 3, 2],
            Vector3::new(0.5, 1.0, 2.0),
            (0..12).map(|v| v as f32 * 0.25).collect(),
        );
        grid.offset = Point3::new(-1.0, 0.5, 3.0);
        grid
    }

    #[test]
    fn written_header_is_ascii_and_data_is_little_endian() {
        let mut out = Vec::new();
        MetaImageFile::write_to(&sample_grid(), &mut out).unwrap();
        let marker = b"ElementDataFile = LOCAL\n";
        let pos = out
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap();
        let header = String::from_utf8(out[..pos].to_vec()).unwrap();
        assert!(header.contains("DimSize = 2 3 2"));
        assert!(header.contains("ElementType = MET_FLOAT"));
        let data = &out[pos + marker.len()..];
        assert_eq!(data.len(), 12 * 4);
        assert_eq!(f32::from_le_bytes([data[4], data[5], data[6], data[7]]), 0.25);
    }

    #[test]
    fn reads_back_written_grid() {
        let grid = sample_grid();
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.mha");
        MetaImageFile::write_to_path(&grid, &path).unwrap();
        let back = MetaImageFile::read_from_path(&path).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn reads_big_endian_short_maps() {
        let mut bytes = b"NDims = 3\nDimSize = 2 1 1\nElementType = MET_SHORT\nBinaryDataByteOrderMSB = True\nElementDataFile = LOCAL\n".to_vec();
        bytes.extend_from_slice(&(-1000i16).to_be_bytes());
        bytes.extend_from_slice(&250i16.to_be_bytes());
        let mut reader = BufReader::new(Cursor::new(bytes));
        let grid = MetaImageFile::read_from(&mut reader).unwrap();
        assert_eq!(grid.data, vec![-1000.0, 250.0]);
        assert_eq!(grid.spacing, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn truncated_data_is_an_io_error() {
        let bytes = b"DimSize = 4 4 4\nElementType = MET_FLOAT\nElementDataFile = LOCAL\n\x00\x00".to_vec();
        let result = MetaImageFile::read_from(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(MetaImageError::Io(_))));
    }

    #[test]
    fn huge_dimensions_fail_without_allocating() {
        let bytes = b"DimSize = 4294967296 4294967296 4294967296\nElementType = MET_FLOAT\nElementDataFile = LOCAL\n".to_vec();
        let result = MetaImageFile::read_from(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(MetaImageError::InvalidField { key, .. }) if key == "DimSize"));

        let bytes = b"DimSize = 65536 65536 1024\nElementType = MET_SHORT\nElementDataFile = LOCAL\n\x00\x00".to_vec();
        let result = MetaImageFile::read_from(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(MetaImageError::Io(_))));
    }

    #[test]
    fn non_positive_spacing_is_rejected() {
        let bytes = b"DimSize = 1 1 1\nElementSpacing = 0 1 1\nElementType = MET_FLOAT\nElementDataFile = LOCAL\n\x00\x00\x00\x00".to_vec();
        let result = MetaImageFile::read_from(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(MetaImageError::InvalidField { key, .. }) if key == "ElementSpacing"));
    }

    #[test]
    fn missing_dimensions_are_reported() {
        let bytes = b"ElementType = MET_FLOAT\nElementDataFile = LOCAL\n".to_vec();
        let result = MetaImageFile::read_from(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(MetaImageError::MissingField("DimSize"))));
    }

    #[test]
    fn loader_distinguishes_missing_files_from_bad_content() {
        let loader = MetaImageLoader;
        assert!(matches!(
            loader.load(Path::new("/no/such/map.mha")),
            Err(VoxelMapError::FileNotFound(_))
        ));

        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.mha");
        std::fs::write(&path, "NDims = 2\nElementDataFile = LOCAL\n").unwrap();
        assert!(matches!(
            loader.load(&path),
            Err(VoxelMapError::Format { .. })
        ));
    }
}
