use nalgebra::{Matrix3, Point3, Vector3};

/// A regular 3D lattice of scalar values placed in space.
///
/// Values are stored with x fastest, then y, then z.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    pub dims: [usize; 3],
    /// Voxel edge lengths in cm.
    pub spacing: Vector3<f64>,
    /// Position of the centre of voxel (0, 0, 0).
    pub offset: Point3<f64>,
    /// Lattice axes as columns.
    pub axes: Matrix3<f64>,
    pub data: Vec<f32>,
}

impl VoxelGrid {
    pub fn new(dims: [usize; 3], spacing: Vector3<f64>, data: Vec<f32>) -> Self {
        Self {
            dims,
            spacing,
            offset: Point3::origin(),
            axes: Matrix3::identity(),
            data,
        }
    }

    /// Saturates instead of overflowing for absurd dimensions.
    pub fn num_voxels(&self) -> usize {
        self.dims.iter().fold(1usize, |n, d| n.saturating_mul(*d))
    }

    pub fn extent(&self) -> Vector3<f64> {
        Vector3::new(
            self.spacing.x * self.dims[0] as f64,
            self.spacing.y * self.dims[1] as f64,
            self.spacing.z * self.dims[2] as f64,
        )
    }
}
