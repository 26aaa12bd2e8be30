use super::ids::{BeamId, RayId};
use super::particle::Particle;
use nalgebra::{Point3, Vector3};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RayError {
    #[error("Ray {index} is invalid: {defect}")]
    InvalidRay { index: usize, defect: RayDefect },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RayDefect {
    #[error("position is not finite")]
    NonFinitePosition,
    #[error("direction is zero or not finite")]
    IllDefinedDirection,
    #[error("kinetic energy {0} MeV is not a finite positive number")]
    InvalidEnergy(f64),
}

/// Phase-space record as submitted by clients: position (cm), direction and
/// kinetic energy (MeV).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSpace {
    pub position: Point3<f64>,
    pub direction: Vector3<f64>,
    pub energy: f64,
}

impl PhaseSpace {
    pub fn new(position: Point3<f64>, direction: Vector3<f64>, energy: f64) -> Self {
        Self {
            position,
            direction,
            energy,
        }
    }

    pub fn validate(&self) -> Result<(), RayDefect> {
        if !self.position.iter().all(|c| c.is_finite()) {
            return Err(RayDefect::NonFinitePosition);
        }
        let norm = self.direction.norm();
        if !norm.is_finite() || norm <= f64::EPSILON {
            return Err(RayDefect::IllDefinedDirection);
        }
        if !self.energy.is_finite() || self.energy <= 0.0 {
            return Err(RayDefect::InvalidEnergy(self.energy));
        }
        Ok(())
    }
}

/// A stored primary. Beam-owned rays are expressed in the beam frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub position: Point3<f64>,
    pub direction: Vector3<f64>,
    pub energy: f64,
    pub particle: Particle,
    pub beam: Option<BeamId>,
}

/// Append-only store of primaries with stable indices until cleared.
#[derive(Debug, Clone, Default)]
pub struct RayStore {
    rays: Vec<Ray>,
}

impl RayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a batch without storing anything.
    pub fn check(rays: &[PhaseSpace]) -> Result<(), RayError> {
        for (index, ray) in rays.iter().enumerate() {
            ray.validate()
                .map_err(|defect| RayError::InvalidRay { index, defect })?;
        }
        Ok(())
    }

    /// Appends a batch atomically; either every ray is stored or none is.
    pub fn add(
        &mut self,
        particle: Particle,
        rays: &[PhaseSpace],
        beam: Option<BeamId>,
    ) -> Result<Range<usize>, RayError> {
        Self::check(rays)?;
        let start = self.rays.len();
        self.rays.extend(rays.iter().map(|ps| Ray {
            position: ps.position,
            direction: ps.direction.normalize(),
            energy: ps.energy,
            particle,
            beam,
        }));
        Ok(start..self.rays.len())
    }

    pub fn get(&self, id: RayId) -> Option<&Ray> {
        self.rays.get(id.0)
    }

    pub fn as_slice(&self) -> &[Ray] {
        &self.rays
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    pub fn clear(&mut self) {
        self.rays.clear();
    }
}
