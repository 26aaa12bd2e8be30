use super::context::SlotSpec;
use crate::core::scoring::ScoreBuffer;

/// Dense per-worker partial sums, one buffer per scorer slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally {
    buffers: Vec<ScoreBuffer>,
    /// Slots that received at least one segment.
    hit: Vec<bool>,
}

impl Tally {
    pub fn new(slots: &[SlotSpec]) -> Self {
        Self {
            buffers: slots
                .iter()
                .map(|slot| ScoreBuffer::zeroed(slot.kind, slot.len))
                .collect(),
            hit: vec![false; slots.len()],
        }
    }

    #[inline]
    pub fn score(
        &mut self,
        slot: &SlotSpec,
        index: usize,
        voxel: usize,
        track_length: f64,
        energy_deposit: f64,
        entered: bool,
    ) {
        self.buffers[index].score(slot.kind, voxel, track_length, energy_deposit, entered);
        self.hit[index] = true;
    }

    /// Adds `other` slot by slot. Both tallies must come from the same slots.
    pub fn merge(&mut self, other: &Tally) {
        for (mine, theirs) in self.buffers.iter_mut().zip(&other.buffers) {
            mine.merge(theirs);
        }
        for (mine, theirs) in self.hit.iter_mut().zip(&other.hit) {
            *mine |= theirs;
        }
    }

    /// Whether any particle was scored into slot `index`.
    pub fn is_hit(&self, index: usize) -> bool {
        self.hit.get(index).copied().unwrap_or(false)
    }

    pub fn buffers(&self) -> &[ScoreBuffer] {
        &self.buffers
    }

    pub fn total(&self, index: usize) -> f64 {
        self.buffers[index].values.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ids::{RegionId, ScorerId};
    use crate::core::scoring::ScorerKind;

    fn slots() -> Vec<SlotSpec> {
        vec![
            SlotSpec {
                region: RegionId(1),
                scorer: ScorerId(0),
                kind: ScorerKind::EnergyDeposit,
                len: 4,
            },
            SlotSpec {
                region: RegionId(1),
                scorer: ScorerId(1),
                kind: ScorerKind::Counts,
                len: 4,
            },
        ]
    }

    #[test]
    fn merge_sums_matching_slots() {
        let slots = slots();
        let mut a = Tally::new(&slots);
        let mut b = Tally::new(&slots);
        a.score(&slots[0], 0, 2, 0.1, 1.5, true);
        b.score(&slots[0], 0, 2, 0.1, 0.5, true);
        b.score(&slots[1], 1, 3, 0.1, 0.5, true);
        b.score(&slots[1], 1, 3, 0.1, 0.5, false);
        a.merge(&b);
        assert_eq!(a.buffers()[0].values, vec![0.0, 0.0, 2.0, 0.0]);
        assert_eq!(a.buffers()[1].values, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(a.total(0), 2.0);
    }

    #[test]
    fn hits_are_tracked_per_slot_and_survive_merge() {
        let slots = slots();
        let mut a = Tally::new(&slots);
        let mut b = Tally::new(&slots);
        assert!(!a.is_hit(0) && !a.is_hit(1));
        b.score(&slots[1], 1, 0, 0.1, 0.0, false);
        a.merge(&b);
        assert!(!a.is_hit(0));
        assert!(a.is_hit(1));
        assert!(!a.is_hit(7));
    }
}
