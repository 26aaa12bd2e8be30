use super::error::FredError;
use std::fmt;
use std::time::Duration;

/// Configuration lifecycle of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    Open,
    Closed,
    TrackingInProgress,
}

/// Outcome of the most recent tracking invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    Idle,
    Running,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    setup: SetupState,
    tracking: TrackingStatus,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            setup: SetupState::Open,
            tracking: TrackingStatus::Idle,
        }
    }
}

impl Lifecycle {
    pub fn setup(&self) -> SetupState {
        self.setup
    }

    pub fn tracking(&self) -> TrackingStatus {
        self.tracking
    }

    /// Guards operations that reshape the scene and are only legal while open.
    pub fn ensure_open(&self, operation: &'static str) -> Result<(), FredError> {
        match self.setup {
            SetupState::Open => Ok(()),
            SetupState::Closed => Err(FredError::SetupClosed { operation }),
            SetupState::TrackingInProgress => Err(FredError::TrackingInProgress { operation }),
        }
    }

    /// Guards operations that are legal any time outside a tracking invocation.
    pub fn ensure_idle(&self, operation: &'static str) -> Result<(), FredError> {
        if self.setup == SetupState::TrackingInProgress {
            return Err(FredError::TrackingInProgress { operation });
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), FredError> {
        self.ensure_idle("close_setup")?;
        self.setup = SetupState::Closed;
        Ok(())
    }

    pub fn begin_tracking(&mut self) -> Result<(), FredError> {
        self.ensure_idle("track")?;
        self.setup = SetupState::TrackingInProgress;
        self.tracking = TrackingStatus::Running;
        Ok(())
    }

    pub fn finish_tracking(&mut self, succeeded: bool) {
        self.setup = SetupState::Closed;
        self.tracking = if succeeded {
            TrackingStatus::Complete
        } else {
            TrackingStatus::Failed
        };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Counters gathered over one tracking invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingReport {
    pub primaries: u64,
    pub secondaries: u64,
    pub steps: u64,
    /// Histories that left the room.
    pub escaped: u64,
    /// Histories that fell below the energy cutoff.
    pub stopped: u64,
    /// Histories ended by a nuclear absorption.
    pub absorbed: u64,
    /// Histories terminated by the per-track step guard.
    pub aborted: u64,
    pub elapsed: Duration,
}

impl TrackingReport {
    pub fn merge(&mut self, other: &TrackingReport) {
        self.primaries += other.primaries;
        self.secondaries += other.secondaries;
        self.steps += other.steps;
        self.escaped += other.escaped;
        self.stopped += other.stopped;
        self.absorbed += other.absorbed;
        self.aborted += other.aborted;
    }
}

impl fmt::Display for TrackingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} primaries, {} secondaries, {} steps (escaped {}, stopped {}, absorbed {}, aborted {}) in {:.3} s",
            self.primaries,
            self.secondaries,
            self.steps,
            self.escaped,
            self.stopped,
            self.absorbed,
            self.aborted,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_setup_rejects_reshaping_but_not_idle_operations() {
        let mut lifecycle = Lifecycle::default();
        assert!(lifecycle.ensure_open("add_region").is_ok());
        lifecycle.close().unwrap();
        assert!(matches!(
            lifecycle.ensure_open("add_region"),
            Err(FredError::SetupClosed {
                operation: "add_region"
            })
        ));
        assert!(lifecycle.ensure_idle("set_region_active").is_ok());
    }

    #[test]
    fn tracking_blocks_every_mutation_until_finished() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.begin_tracking().unwrap();
        assert_eq!(lifecycle.tracking(), TrackingStatus::Running);
        assert!(matches!(
            lifecycle.ensure_idle("set_threads"),
            Err(FredError::TrackingInProgress { .. })
        ));
        assert!(lifecycle.begin_tracking().is_err());
        lifecycle.finish_tracking(true);
        assert_eq!(lifecycle.setup(), SetupState::Closed);
        assert_eq!(lifecycle.tracking(), TrackingStatus::Complete);
    }

    #[test]
    fn reset_reopens_setup() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.begin_tracking().unwrap();
        lifecycle.finish_tracking(false);
        assert_eq!(lifecycle.tracking(), TrackingStatus::Failed);
        lifecycle.reset();
        assert_eq!(lifecycle.setup(), SetupState::Open);
        assert_eq!(lifecycle.tracking(), TrackingStatus::Idle);
    }

    #[test]
    fn reports_merge_counters() {
        let mut total = TrackingReport::default();
        let part = TrackingReport {
            primaries: 2,
            steps: 10,
            escaped: 1,
            ..Default::default()
        };
        total.merge(&part);
        total.merge(&part);
        assert_eq!(total.primaries, 4);
        assert_eq!(total.steps, 20);
        assert_eq!(total.escaped, 2);
    }
}
