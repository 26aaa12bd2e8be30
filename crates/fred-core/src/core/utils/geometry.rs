use nalgebra::{Point3, Vector3};

/// An axis-aligned box in region-local coordinates subdivided into a regular
/// voxel lattice. Voxels are numbered with x fastest, then y, then z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxGrid {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
    pub dims: [usize; 3],
}

impl BoxGrid {
    /// Box `[-pivot·L, (1 - pivot)·L]` split into `dims` voxels.
    pub fn from_extent(extent: &Vector3<f64>, pivot: &Vector3<f64>, dims: [usize; 3]) -> Self {
        let min = Point3::from(-pivot.component_mul(extent));
        let max = min + extent;
        Self { min, max, dims }
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn voxel_size(&self) -> Vector3<f64> {
        let e = self.extent();
        Vector3::new(
            e.x / self.dims[0] as f64,
            e.y / self.dims[1] as f64,
            e.z / self.dims[2] as f64,
        )
    }

    pub fn voxel_volume(&self) -> f64 {
        self.voxel_size().product()
    }

    pub fn num_voxels(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Voxel cell coordinates of a point, clamped into the lattice.
    pub fn cell_of(&self, p: &Point3<f64>) -> [usize; 3] {
        let size = self.voxel_size();
        let mut cell = [0usize; 3];
        for i in 0..3 {
            let f = ((p[i] - self.min[i]) / size[i]).floor();
            cell[i] = if f <= 0.0 {
                0
            } else {
                (f as usize).min(self.dims[i] - 1)
            };
        }
        cell
    }

    pub fn linear_index(&self, cell: [usize; 3]) -> usize {
        cell[0] + self.dims[0] * (cell[1] + self.dims[1] * cell[2])
    }

    pub fn voxel_of(&self, p: &Point3<f64>) -> usize {
        self.linear_index(self.cell_of(p))
    }

    /// Centre of the voxel with the given linear index.
    pub fn voxel_centre(&self, index: usize) -> Point3<f64> {
        let nx = self.dims[0];
        let ny = self.dims[1];
        let cell = [index % nx, (index / nx) % ny, index / (nx * ny)];
        let size = self.voxel_size();
        Point3::new(
            self.min.x + (cell[0] as f64 + 0.5) * size.x,
            self.min.y + (cell[1] as f64 + 0.5) * size.y,
            self.min.z + (cell[2] as f64 + 0.5) * size.z,
        )
    }

    /// Distance along `dir` from an interior point to the box surface.
    pub fn distance_to_exit(&self, p: &Point3<f64>, dir: &Vector3<f64>) -> f64 {
        let mut t = f64::INFINITY;
        for i in 0..3 {
            if dir[i] > 0.0 {
                t = t.min((self.max[i] - p[i]) / dir[i]);
            } else if dir[i] < 0.0 {
                t = t.min((self.min[i] - p[i]) / dir[i]);
            }
        }
        t.max(0.0)
    }

    /// Distance along `dir` from an exterior point to the box surface, if the
    /// half-line hits the box.
    pub fn distance_to_entry(&self, p: &Point3<f64>, dir: &Vector3<f64>) -> Option<f64> {
        let mut t_near = f64::NEG_INFINITY;
        let mut t_far = f64::INFINITY;
        for i in 0..3 {
            if dir[i] == 0.0 {
                if p[i] < self.min[i] || p[i] > self.max[i] {
                    return None;
                }
                continue;
            }
            let t1 = (self.min[i] - p[i]) / dir[i];
            let t2 = (self.max[i] - p[i]) / dir[i];
            let (lo, hi) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            t_near = t_near.max(lo);
            t_far = t_far.min(hi);
        }
        if t_near <= t_far && t_far > 0.0 {
            Some(t_near.max(0.0))
        } else {
            None
        }
    }

    /// Distance along `dir` to the next voxel plane crossed from `p`.
    pub fn distance_to_voxel_boundary(&self, p: &Point3<f64>, dir: &Vector3<f64>) -> f64 {
        let size = self.voxel_size();
        let cell = self.cell_of(p);
        let mut t = f64::INFINITY;
        for i in 0..3 {
            if dir[i] > 0.0 {
                let plane = self.min[i] + (cell[i] + 1) as f64 * size[i];
                t = t.min((plane - p[i]) / dir[i]);
            } else if dir[i] < 0.0 {
                let plane = self.min[i] + cell[i] as f64 * size[i];
                t = t.min((plane - p[i]) / dir[i]);
            }
        }
        t.max(0.0)
    }
}

/// Rotates `dir` by polar angle `theta` and azimuth `phi` about itself.
pub fn deflect(dir: &Vector3<f64>, theta: f64, phi: f64) -> Vector3<f64> {
    let helper = if dir.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let e1 = (helper - dir * dir.dot(&helper)).normalize();
    let e2 = dir.cross(&e1);
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = phi.sin_cos();
    (dir * ct + (e1 * cp + e2 * sp) * st).normalize()
}
