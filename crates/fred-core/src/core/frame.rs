use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, Unit, UnitQuaternion, Vector3};
use thiserror::Error;

/// Tolerance used for perpendicularity and handedness checks on basis vectors.
pub const BASIS_TOLERANCE: f64 = 1e-5;

const HELPER_SWITCH_THRESHOLD: f64 = 0.9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("Ill-defined {axis} vector: {vector:?}")]
    IllDefinedVector {
        axis: &'static str,
        vector: [f64; 3],
    },
    #[error("Basis vectors {first} and {second} are not perpendicular (dot = {dot:.3e})")]
    NotPerpendicular {
        first: &'static str,
        second: &'static str,
        dot: f64,
    },
    #[error("Basis vectors form a left-handed frame")]
    LeftHanded,
}

/// A right-handed orthonormal basis with `left × up = front`.
///
/// In the local coordinates of the owner, `left` is the x axis, `up` the y axis
/// and `front` the z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    left: Unit<Vector3<f64>>,
    up: Unit<Vector3<f64>>,
    front: Unit<Vector3<f64>>,
}

impl Default for Basis {
    fn default() -> Self {
        Self::identity()
    }
}

impl Basis {
    pub fn identity() -> Self {
        Self {
            left: Vector3::x_axis(),
            up: Vector3::y_axis(),
            front: Vector3::z_axis(),
        }
    }

    /// Builds a basis from any subset of the three axis vectors.
    ///
    /// Missing vectors are completed deterministically: a lone vector is paired
    /// with a helper axis made perpendicular by Gram-Schmidt, two vectors yield
    /// the third by a right-handed cross product, and three vectors are only
    /// validated.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::IllDefinedVector`] for zero-length or non-finite
    /// input, [`FrameError::NotPerpendicular`] when two given vectors are not
    /// orthogonal within [`BASIS_TOLERANCE`], and [`FrameError::LeftHanded`] when
    /// three given vectors are orthonormal but left-handed.
    pub fn complete(
        front: Option<Vector3<f64>>,
        up: Option<Vector3<f64>>,
        left: Option<Vector3<f64>>,
    ) -> Result<Self, FrameError> {
        let front = front.map(|v| normalize_axis("front", v)).transpose()?;
        let up = up.map(|v| normalize_axis("up", v)).transpose()?;
        let left = left.map(|v| normalize_axis("left", v)).transpose()?;

        match (front, up, left) {
            (None, None, None) => Ok(Self::identity()),
            (Some(f), None, None) => {
                let u = gram_schmidt(&f, &Vector3::y(), &Vector3::z());
                Ok(Self::from_front_up(f, u))
            }
            (None, Some(u), None) => {
                let f = gram_schmidt(&u, &Vector3::z(), &-Vector3::y());
                Ok(Self::from_front_up(f, u))
            }
            (None, None, Some(l)) => {
                let f = gram_schmidt(&l, &Vector3::z(), &Vector3::x());
                Ok(Self::from_front_left(f, l))
            }
            (Some(f), Some(u), None) => {
                check_perpendicular(("front", &f), ("up", &u))?;
                Ok(Self::from_front_up(f, u))
            }
            (Some(f), None, Some(l)) => {
                check_perpendicular(("front", &f), ("left", &l))?;
                Ok(Self::from_front_left(f, l))
            }
            (None, Some(u), Some(l)) => {
                check_perpendicular(("up", &u), ("left", &l))?;
                let f = Unit::new_normalize(l.cross(&u));
                Ok(Self {
                    left: l,
                    up: Unit::new_normalize(f.cross(&l)),
                    front: f,
                })
            }
            (Some(f), Some(u), Some(l)) => {
                check_perpendicular(("front", &f), ("up", &u))?;
                check_perpendicular(("front", &f), ("left", &l))?;
                check_perpendicular(("up", &u), ("left", &l))?;
                if l.cross(&u).dot(&f) < 0.0 {
                    return Err(FrameError::LeftHanded);
                }
                Ok(Self {
                    left: l,
                    up: u,
                    front: f,
                })
            }
        }
    }

    fn from_front_up(f: Unit<Vector3<f64>>, u: Unit<Vector3<f64>>) -> Self {
        let l = Unit::new_normalize(u.cross(&f));
        Self {
            left: l,
            up: Unit::new_normalize(f.cross(&l)),
            front: f,
        }
    }

    fn from_front_left(f: Unit<Vector3<f64>>, l: Unit<Vector3<f64>>) -> Self {
        let u = Unit::new_normalize(f.cross(&l));
        Self {
            left: Unit::new_normalize(u.cross(&f)),
            up: u,
            front: f,
        }
    }

    pub fn left(&self) -> Vector3<f64> {
        self.left.into_inner()
    }

    pub fn up(&self) -> Vector3<f64> {
        self.up.into_inner()
    }

    pub fn front(&self) -> Vector3<f64> {
        self.front.into_inner()
    }

    /// Rotation taking local coordinates (x = left, y = up, z = front) to the
    /// coordinates the basis is expressed in.
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[
            self.left(),
            self.up(),
            self.front(),
        ]))
    }

    pub fn from_rotation(rotation: &Rotation3<f64>) -> Self {
        let m = rotation.matrix();
        Self {
            left: Unit::new_normalize(m.column(0).into_owned()),
            up: Unit::new_normalize(m.column(1).into_owned()),
            front: Unit::new_normalize(m.column(2).into_owned()),
        }
    }
}

fn normalize_axis(axis: &'static str, v: Vector3<f64>) -> Result<Unit<Vector3<f64>>, FrameError> {
    let norm = v.norm();
    if !norm.is_finite() || norm <= f64::EPSILON {
        return Err(FrameError::IllDefinedVector {
            axis,
            vector: [v.x, v.y, v.z],
        });
    }
    Ok(Unit::new_unchecked(v / norm))
}

fn check_perpendicular(
    (first, a): (&'static str, &Unit<Vector3<f64>>),
    (second, b): (&'static str, &Unit<Vector3<f64>>),
) -> Result<(), FrameError> {
    let dot = a.dot(b);
    if dot.abs() > BASIS_TOLERANCE {
        return Err(FrameError::NotPerpendicular { first, second, dot });
    }
    Ok(())
}

fn gram_schmidt(
    v: &Unit<Vector3<f64>>,
    helper: &Vector3<f64>,
    fallback: &Vector3<f64>,
) -> Unit<Vector3<f64>> {
    let h = if v.dot(helper).abs() > HELPER_SWITCH_THRESHOLD {
        fallback
    } else {
        helper
    };
    Unit::new_normalize(h - v.into_inner() * v.dot(h))
}

/// An origin plus a basis, expressed relative to some enclosing frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameOfReference {
    pub origin: Point3<f64>,
    pub basis: Basis,
}

impl FrameOfReference {
    pub fn new(origin: Point3<f64>, basis: Basis) -> Self {
        Self { origin, basis }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_vectors(
        origin: Point3<f64>,
        front: Option<Vector3<f64>>,
        up: Option<Vector3<f64>>,
        left: Option<Vector3<f64>>,
    ) -> Result<Self, FrameError> {
        if !(origin.x.is_finite() && origin.y.is_finite() && origin.z.is_finite()) {
            return Err(FrameError::IllDefinedVector {
                axis: "origin",
                vector: [origin.x, origin.y, origin.z],
            });
        }
        Ok(Self {
            origin,
            basis: Basis::complete(front, up, left)?,
        })
    }

    /// Rigid transform taking local points to the enclosing frame.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.origin.coords),
            UnitQuaternion::from_rotation_matrix(&self.basis.rotation()),
        )
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self {
            origin: Point3::from(iso.translation.vector),
            basis: Basis::from_rotation(&iso.rotation.to_rotation_matrix()),
        }
    }

    pub fn point_to_parent(&self, p: &Point3<f64>) -> Point3<f64> {
        self.to_isometry().transform_point(p)
    }

    pub fn point_from_parent(&self, p: &Point3<f64>) -> Point3<f64> {
        self.to_isometry().inverse_transform_point(p)
    }

    pub fn vector_to_parent(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.basis.rotation() * v
    }

    pub fn vector_from_parent(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.basis.rotation().inverse() * v
    }
}
