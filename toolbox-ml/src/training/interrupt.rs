//! Interruption of a training run and the place to resume it from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based `(epoch, batch)` position in a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumePoint {
    pub epoch: usize,
    pub batch: usize,
}

impl ResumePoint {
    /// The very beginning of a run.
    pub const START: ResumePoint = ResumePoint { epoch: 1, batch: 1 };

    pub fn new(epoch: usize, batch: usize) -> Self {
        Self { epoch, batch }
    }

    pub fn is_start(&self) -> bool {
        *self == Self::START
    }
}

impl Default for ResumePoint {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {}, batch {}", self.epoch, self.batch)
    }
}

/// Raised when a run is cancelled (usually by Ctrl-C).
///
/// `batch == 0` means the run stopped on an epoch boundary, before any
/// batch of `epoch` started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingInterrupted {
    pub epoch: usize,
    pub batch: usize,
}

impl TrainingInterrupted {
    pub fn new(epoch: usize, batch: usize) -> Self {
        Self { epoch, batch }
    }

    /// Where a follow-up run should start so no batch is repeated or lost.
    pub fn resume_point(&self) -> ResumePoint {
        ResumePoint::new(self.epoch, self.batch.max(1))
    }

    pub fn message(&self) -> String {
        if self.batch > 0 {
            format!(
                "training was interrupted by user at epoch {}, batch {}.",
                self.epoch, self.batch
            )
        } else {
            format!("training was interrupted by user at epoch {}.", self.epoch)
        }
    }
}

impl fmt::Display for TrainingInterrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrainingInterrupted, {}", self.message())
    }
}

impl std::error::Error for TrainingInterrupted {}
