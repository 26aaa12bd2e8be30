use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MEV_TO_JOULE: f64 = 1.602176634e-13;
/// Conversion from MeV/cm to keV/µm.
const MEV_PER_CM_TO_KEV_PER_UM: f64 = 0.1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoringError {
    #[error("Unknown scorer kind: '{0}'")]
    UnknownKind(String),
    #[error("Scorer has already been evaluated")]
    AlreadyEvaluated,
    #[error("Buffer size mismatch: scorer has {expected} voxels, buffer holds {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },
}

/// Quantity a scorer accumulates per voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScorerKind {
    /// Track length; evaluates to fluence in cm⁻².
    TrackLength,
    /// Deposited energy in MeV.
    EnergyDeposit,
    /// Absorbed dose; evaluates to Gy.
    Dose,
    /// Dose-averaged linear energy transfer; evaluates to keV/µm.
    LetD,
    /// Number of particle entries into the voxel.
    Counts,
}

impl ScorerKind {
    pub fn name(self) -> &'static str {
        match self {
            ScorerKind::TrackLength => "track",
            ScorerKind::EnergyDeposit => "edep",
            ScorerKind::Dose => "dose",
            ScorerKind::LetD => "letd",
            ScorerKind::Counts => "counts",
        }
    }

    /// LETd keeps a separate dose-weight denominator.
    pub fn has_weights(self) -> bool {
        matches!(self, ScorerKind::LetD)
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScorerKind {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "track" | "tracklength" | "fluence" => Ok(ScorerKind::TrackLength),
            "edep" | "energy" => Ok(ScorerKind::EnergyDeposit),
            "dose" => Ok(ScorerKind::Dose),
            "letd" => Ok(ScorerKind::LetD),
            "counts" | "count" => Ok(ScorerKind::Counts),
            _ => Err(ScoringError::UnknownKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerState {
    Accumulating,
    Evaluated,
    Exported,
}

/// Dense raw sums for one scorer, sized to its region's voxel count.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBuffer {
    pub values: Vec<f64>,
    /// Dose weights for LETd; empty for every other kind.
    pub weights: Vec<f64>,
}

impl ScoreBuffer {
    pub fn zeroed(kind: ScorerKind, len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            weights: if kind.has_weights() {
                vec![0.0; len]
            } else {
                Vec::new()
            },
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
        self.weights.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Element-wise sum of another buffer of the same layout.
    pub fn merge(&mut self, other: &ScoreBuffer) {
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += b;
        }
        for (a, b) in self.weights.iter_mut().zip(&other.weights) {
            *a += b;
        }
    }

    /// Records one step segment inside `voxel`.
    ///
    /// `entered` marks the first segment of a particle in this voxel.
    pub fn score(
        &mut self,
        kind: ScorerKind,
        voxel: usize,
        track_length: f64,
        energy_deposit: f64,
        entered: bool,
    ) {
        match kind {
            ScorerKind::TrackLength => self.values[voxel] += track_length,
            ScorerKind::EnergyDeposit | ScorerKind::Dose => self.values[voxel] += energy_deposit,
            ScorerKind::LetD => {
                if track_length > 0.0 && energy_deposit > 0.0 {
                    let let_local = energy_deposit / track_length;
                    self.values[voxel] += energy_deposit * let_local;
                    self.weights[voxel] += energy_deposit;
                }
            }
            ScorerKind::Counts => {
                if entered {
                    self.values[voxel] += 1.0;
                }
            }
        }
    }
}

/// Scoring grid attached to a region.
#[derive(Debug, Clone)]
pub struct Scorer {
    kind: ScorerKind,
    state: ScorerState,
    raw: ScoreBuffer,
    evaluated: Option<Vec<f64>>,
}

impl Scorer {
    pub fn new(kind: ScorerKind, num_voxels: usize) -> Self {
        Self {
            kind,
            state: ScorerState::Accumulating,
            raw: ScoreBuffer::zeroed(kind, num_voxels),
            evaluated: None,
        }
    }

    pub fn kind(&self) -> ScorerKind {
        self.kind
    }

    pub fn state(&self) -> ScorerState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn raw(&self) -> &ScoreBuffer {
        &self.raw
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.evaluated = None;
        self.state = ScorerState::Accumulating;
    }

    /// Adds a tracking partial; a previous evaluation becomes stale and is dropped.
    pub fn accumulate(&mut self, partial: &ScoreBuffer) {
        self.raw.merge(partial);
        self.evaluated = None;
        self.state = ScorerState::Accumulating;
    }

    /// Normalizes the raw sums into physical units.
    ///
    /// `voxel_volume` is in cm³; `density_of` gives the mass density (g/cm³)
    /// of each voxel and is only consulted for dose.
    pub fn evaluate(
        &mut self,
        voxel_volume: f64,
        density_of: impl Fn(usize) -> f64,
    ) -> Result<(), ScoringError> {
        if self.state != ScorerState::Accumulating {
            return Err(ScoringError::AlreadyEvaluated);
        }
        let values = match self.kind {
            ScorerKind::EnergyDeposit | ScorerKind::Counts => self.raw.values.clone(),
            ScorerKind::TrackLength => self
                .raw
                .values
                .iter()
                .map(|l| l / voxel_volume)
                .collect(),
            ScorerKind::Dose => self
                .raw
                .values
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    let mass_kg = density_of(i) * voxel_volume * 1e-3;
                    if mass_kg > 0.0 {
                        e * MEV_TO_JOULE / mass_kg
                    } else {
                        0.0
                    }
                })
                .collect(),
            ScorerKind::LetD => self
                .raw
                .values
                .iter()
                .zip(&self.raw.weights)
                .map(|(num, den)| {
                    if *den > 0.0 {
                        num / den * MEV_PER_CM_TO_KEV_PER_UM
                    } else {
                        0.0
                    }
                })
                .collect(),
        };
        self.evaluated = Some(values);
        self.state = ScorerState::Evaluated;
        Ok(())
    }

    pub fn mark_exported(&mut self) {
        if self.state == ScorerState::Evaluated {
            self.state = ScorerState::Exported;
        }
    }

    /// Values visible to clients: evaluated values once evaluated, raw sums otherwise.
    pub fn values(&self) -> &[f64] {
        self.evaluated.as_deref().unwrap_or(self.raw.values.as_slice())
    }

    pub fn copy_into(&self, buffer: &mut [f64]) -> Result<(), ScoringError> {
        if buffer.len() != self.len() {
            return Err(ScoringError::BufferSizeMismatch {
                expected: self.len(),
                actual: buffer.len(),
            });
        }
        buffer.copy_from_slice(self.values());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    fn partial(kind: ScorerKind, len: usize, voxel: usize, length: f64, edep: f64) -> ScoreBuffer {
        let mut buf = ScoreBuffer::zeroed(kind, len);
        buf.score(kind, voxel, length, edep, true);
        buf
    }

    #[test]
    fn kinds_parse_from_names() {
        assert_eq!("eDep".parse::<ScorerKind>().unwrap(), ScorerKind::EnergyDeposit);
        assert_eq!("LETd".parse::<ScorerKind>().unwrap(), ScorerKind::LetD);
        assert!("bogus".parse::<ScorerKind>().is_err());
    }

    #[test]
    fn energy_deposit_evaluation_keeps_raw_sums() {
        let mut scorer = Scorer::new(ScorerKind::EnergyDeposit, 4);
        scorer.accumulate(&partial(ScorerKind::EnergyDeposit, 4, 2, 0.5, 3.0));
        scorer.evaluate(1.0, |_| 1.0).unwrap();
        assert_eq!(scorer.values(), &[0.0, 0.0, 3.0, 0.0]);
        assert_eq!(scorer.state(), ScorerState::Evaluated);
    }

    #[test]
    fn dose_is_energy_per_mass_in_gray() {
        let mut scorer = Scorer::new(ScorerKind::Dose, 2);
        scorer.accumulate(&partial(ScorerKind::Dose, 2, 0, 1.0, 1.0));
        scorer.evaluate(0.5, |_| 2.0).unwrap();
        let expected = MEV_TO_JOULE / (2.0 * 0.5 * 1e-3);
        assert!(f64_approx_equal(scorer.values()[0], expected));
    }

    #[test]
    fn dose_in_vacuum_voxel_is_zero() {
        let mut scorer = Scorer::new(ScorerKind::Dose, 1);
        scorer.accumulate(&partial(ScorerKind::Dose, 1, 0, 1.0, 1.0));
        scorer.evaluate(1.0, |_| 0.0).unwrap();
        assert_eq!(scorer.values(), &[0.0]);
    }

    #[test]
    fn letd_is_dose_weighted_mean_in_kev_per_um() {
        let mut scorer = Scorer::new(ScorerKind::LetD, 1);
        // 2 MeV over 1 cm (2 MeV/cm) and 6 MeV over 1 cm (6 MeV/cm).
        scorer.accumulate(&partial(ScorerKind::LetD, 1, 0, 1.0, 2.0));
        scorer.accumulate(&partial(ScorerKind::LetD, 1, 0, 1.0, 6.0));
        scorer.evaluate(1.0, |_| 1.0).unwrap();
        let expected = (2.0 * 2.0 + 6.0 * 6.0) / 8.0 * 0.1;
        assert!(f64_approx_equal(scorer.values()[0], expected));
    }

    #[test]
    fn track_length_evaluates_to_fluence() {
        let mut scorer = Scorer::new(ScorerKind::TrackLength, 1);
        scorer.accumulate(&partial(ScorerKind::TrackLength, 1, 0, 3.0, 0.0));
        scorer.evaluate(0.25, |_| 1.0).unwrap();
        assert!(f64_approx_equal(scorer.values()[0], 12.0));
    }

    #[test]
    fn counts_only_increment_on_entry() {
        let mut buf = ScoreBuffer::zeroed(ScorerKind::Counts, 1);
        buf.score(ScorerKind::Counts, 0, 0.1, 0.0, true);
        buf.score(ScorerKind::Counts, 0, 0.1, 0.0, false);
        assert_eq!(buf.values, vec![1.0]);
    }

    #[test]
    fn double_evaluation_is_rejected() {
        let mut scorer = Scorer::new(ScorerKind::Dose, 1);
        scorer.evaluate(1.0, |_| 1.0).unwrap();
        assert_eq!(
            scorer.evaluate(1.0, |_| 1.0),
            Err(ScoringError::AlreadyEvaluated)
        );
        scorer.mark_exported();
        assert_eq!(
            scorer.evaluate(1.0, |_| 1.0),
            Err(ScoringError::AlreadyEvaluated)
        );
    }

    #[test]
    fn new_deposits_discard_stale_evaluation() {
        let mut scorer = Scorer::new(ScorerKind::TrackLength, 1);
        scorer.accumulate(&partial(ScorerKind::TrackLength, 1, 0, 1.0, 0.0));
        scorer.evaluate(0.5, |_| 1.0).unwrap();
        assert_eq!(scorer.values(), &[2.0]);

        scorer.accumulate(&partial(ScorerKind::TrackLength, 1, 0, 1.0, 0.0));
        assert_eq!(scorer.state(), ScorerState::Accumulating);
        assert_eq!(scorer.values(), &[2.0]);
        scorer.evaluate(0.5, |_| 1.0).unwrap();
        assert_eq!(scorer.values(), &[4.0]);
    }

    #[test]
    fn reset_zeroes_and_reopens_scorer() {
        let mut scorer = Scorer::new(ScorerKind::EnergyDeposit, 2);
        scorer.accumulate(&partial(ScorerKind::EnergyDeposit, 2, 1, 1.0, 5.0));
        scorer.evaluate(1.0, |_| 1.0).unwrap();
        scorer.reset();
        assert_eq!(scorer.state(), ScorerState::Accumulating);
        assert_eq!(scorer.values(), &[0.0, 0.0]);
        scorer.reset();
        assert_eq!(scorer.values(), &[0.0, 0.0]);
    }

    #[test]
    fn copy_into_checks_buffer_size() {
        let scorer = Scorer::new(ScorerKind::Dose, 3);
        let mut small = [0.0; 2];
        assert_eq!(
            scorer.copy_into(&mut small),
            Err(ScoringError::BufferSizeMismatch {
                expected: 3,
                actual: 2
            })
        );
        let mut exact = [1.0; 3];
        scorer.copy_into(&mut exact).unwrap();
        assert_eq!(exact, [0.0; 3]);
    }
}
