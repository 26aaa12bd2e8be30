use super::ids::{BeamId, FieldId, RayId};
use super::particle::Particle;
use super::scene::Reference;
use crate::core::frame::FrameOfReference;
use nalgebra::Isometry3;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BeamError {
    #[error("Beam {0} not found")]
    BeamNotFound(BeamId),
    #[error("Field {0} not found")]
    FieldNotFound(FieldId),
    #[error("Beam {beam} carries {expected} rays; cannot add {found}")]
    ParticleMismatch {
        beam: BeamId,
        expected: Particle,
        found: Particle,
    },
    #[error("Beam {beam} does not belong to field {field}")]
    ForeignField { beam: BeamId, field: FieldId },
}

/// A treatment field: a frame of reference shared by its pencil beams.
#[derive(Debug, Clone, Default)]
pub struct Field {
    /// Placement in global coordinates.
    pub(crate) frame: FrameOfReference,
}

impl Field {
    pub fn frame(&self) -> &FrameOfReference {
        &self.frame
    }
}

/// Fields addressed by stable indices; deleted fields leave an empty slot.
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    fields: Vec<Option<Field>>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self) -> FieldId {
        self.fields.push(Some(Field::default()));
        FieldId(self.fields.len() - 1)
    }

    pub fn get(&self, id: FieldId) -> Result<&Field, BeamError> {
        self.fields
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(BeamError::FieldNotFound(id))
    }

    pub fn contains(&self, id: FieldId) -> bool {
        self.get(id).is_ok()
    }

    pub fn set_frame(&mut self, id: FieldId, frame: FrameOfReference) -> Result<(), BeamError> {
        let field = self
            .fields
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(BeamError::FieldNotFound(id))?;
        field.frame = frame;
        Ok(())
    }

    /// Transform taking field-local points to global coordinates.
    pub fn isometry(&self, id: FieldId) -> Result<Isometry3<f64>, BeamError> {
        Ok(self.get(id)?.frame.to_isometry())
    }

    pub fn delete(&mut self, id: FieldId) -> Result<Field, BeamError> {
        self.fields
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(BeamError::FieldNotFound(id))
    }

    /// Number of live fields.
    pub fn count(&self) -> usize {
        self.fields.iter().flatten().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|f| (FieldId(i), f)))
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

/// A group of rays sharing a frame of reference and a particle species.
#[derive(Debug, Clone, Default)]
pub struct Beam {
    /// Frame the beam placement is expressed in.
    pub(crate) reference: Reference,
    pub(crate) frame: FrameOfReference,
    pub(crate) field: Option<FieldId>,
    pub(crate) particle: Option<Particle>,
    pub(crate) rays: Vec<RayId>,
}

impl Beam {
    pub fn reference(&self) -> Reference {
        self.reference
    }

    pub fn frame(&self) -> &FrameOfReference {
        &self.frame
    }

    /// Field the beam belongs to, if it is a pencil beam of a field.
    pub fn field(&self) -> Option<FieldId> {
        self.field
    }

    pub fn particle(&self) -> Option<Particle> {
        self.particle
    }

    pub fn rays(&self) -> &[RayId] {
        &self.rays
    }
}

/// Beams addressed by stable indices; deleted beams leave an empty slot.
#[derive(Debug, Clone, Default)]
pub struct BeamStore {
    beams: Vec<Option<Beam>>,
}

impl BeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a beam; a beam of a field is placed relative to that field.
    pub fn add(&mut self, field: Option<FieldId>) -> BeamId {
        let reference = field.map_or(Reference::Global, Reference::Field);
        self.beams.push(Some(Beam {
            reference,
            field,
            ..Beam::default()
        }));
        BeamId(self.beams.len() - 1)
    }

    pub fn get(&self, id: BeamId) -> Result<&Beam, BeamError> {
        self.beams
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(BeamError::BeamNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: BeamId) -> Result<&mut Beam, BeamError> {
        self.beams
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(BeamError::BeamNotFound(id))
    }

    pub fn contains(&self, id: BeamId) -> bool {
        self.get(id).is_ok()
    }

    /// Places a beam. Only members of a field may be placed relative to it.
    pub fn set_placement(
        &mut self,
        id: BeamId,
        frame: FrameOfReference,
        reference: Reference,
    ) -> Result<(), BeamError> {
        let beam = self.get_mut(id)?;
        if let Reference::Field(field) = reference {
            if beam.field != Some(field) {
                return Err(BeamError::ForeignField { beam: id, field });
            }
        }
        beam.frame = frame;
        beam.reference = reference;
        Ok(())
    }

    /// Checks that `particle` may be added to the beam.
    pub fn check_particle(&self, id: BeamId, particle: Particle) -> Result<(), BeamError> {
        match self.get(id)?.particle {
            Some(expected) if expected != particle => Err(BeamError::ParticleMismatch {
                beam: id,
                expected,
                found: particle,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn attach_rays(
        &mut self,
        id: BeamId,
        particle: Particle,
        rays: impl IntoIterator<Item = RayId>,
    ) -> Result<(), BeamError> {
        self.check_particle(id, particle)?;
        let beam = self.get_mut(id)?;
        beam.particle = Some(particle);
        beam.rays.extend(rays);
        Ok(())
    }

    pub fn delete(&mut self, id: BeamId) -> Result<Beam, BeamError> {
        self.beams
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(BeamError::BeamNotFound(id))
    }

    /// Deletes every beam of `field`, returning their ids in index order.
    pub fn delete_field_members(&mut self, field: FieldId) -> Vec<BeamId> {
        let mut deleted = Vec::new();
        for (i, slot) in self.beams.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|b| b.field == Some(field)) {
                *slot = None;
                deleted.push(BeamId(i));
            }
        }
        deleted
    }

    /// Number of beam slots, deleted ones included. Beam ids are below this.
    pub fn len(&self) -> usize {
        self.beams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    /// Number of live beams.
    pub fn count(&self) -> usize {
        self.beams.iter().flatten().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BeamId, &Beam)> {
        self.beams
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (BeamId(i), b)))
    }

    /// Drops every beam's ray list; placements and species stay.
    pub fn clear_rays(&mut self) {
        for beam in self.beams.iter_mut().flatten() {
            beam.rays.clear();
            beam.particle = None;
        }
    }

    pub fn clear(&mut self) {
        self.beams.clear();
    }
}
