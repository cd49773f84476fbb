//! Lifecycle hooks for the training loop.
//!
//! Every slot is optional. A hook that returns an error aborts the run and
//! the error is handed back to the caller unchanged.

use crate::error::MlError;
use crate::training::interrupt::ResumePoint;

type RunHook<'h, P> = Box<dyn FnMut(&mut P) -> Result<(), MlError> + 'h>;
type EpochHook<'h, P> = Box<dyn FnMut(&mut P, usize) -> Result<(), MlError> + 'h>;
type BatchHook<'h, P, B> = Box<dyn FnMut(&mut P, usize, usize, &B) -> Result<(), MlError> + 'h>;
type InterruptHook<'h, P> = Box<dyn FnMut(&mut P, ResumePoint) -> Result<(), MlError> + 'h>;

/// Callback slots invoked by [`TrainLoop`](crate::training::TrainLoop).
///
/// `P` is what the hooks get to work on (usually
/// [`TrainingParts`](crate::training::TrainingParts)), `B` is the batch type.
pub struct Hooks<'h, P, B> {
    start_of_training: Option<RunHook<'h, P>>,
    start_of_epoch: Option<EpochHook<'h, P>>,
    start_of_batch: Option<BatchHook<'h, P, B>>,
    end_of_batch: Option<BatchHook<'h, P, B>>,
    end_of_epoch: Option<EpochHook<'h, P>>,
    end_of_training: Option<RunHook<'h, P>>,
    interrupt: Option<InterruptHook<'h, P>>,
}

impl<P, B> Default for Hooks<'_, P, B> {
    fn default() -> Self {
        Self {
            start_of_training: None,
            start_of_epoch: None,
            start_of_batch: None,
            end_of_batch: None,
            end_of_epoch: None,
            end_of_training: None,
            interrupt: None,
        }
    }
}

impl<'h, P, B> Hooks<'h, P, B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs once, only when a run starts from the very first batch.
    pub fn on_start_of_training(
        mut self,
        f: impl FnMut(&mut P) -> Result<(), MlError> + 'h,
    ) -> Self {
        self.start_of_training = Some(Box::new(f));
        self
    }

    pub fn on_start_of_epoch(
        mut self,
        f: impl FnMut(&mut P, usize) -> Result<(), MlError> + 'h,
    ) -> Self {
        self.start_of_epoch = Some(Box::new(f));
        self
    }

    /// Receives `(parts, epoch, batch, data)`, both counters 1-based.
    pub fn on_start_of_batch(
        mut self,
        f: impl FnMut(&mut P, usize, usize, &B) -> Result<(), MlError> + 'h,
    ) -> Self {
        self.start_of_batch = Some(Box::new(f));
        self
    }

    pub fn on_end_of_batch(
        mut self,
        f: impl FnMut(&mut P, usize, usize, &B) -> Result<(), MlError> + 'h,
    ) -> Self {
        self.end_of_batch = Some(Box::new(f));
        self
    }

    pub fn on_end_of_epoch(
        mut self,
        f: impl FnMut(&mut P, usize) -> Result<(), MlError> + 'h,
    ) -> Self {
        self.end_of_epoch = Some(Box::new(f));
        self
    }

    /// Runs after the last epoch. Skipped when the run is interrupted.
    pub fn on_end_of_training(
        mut self,
        f: impl FnMut(&mut P) -> Result<(), MlError> + 'h,
    ) -> Self {
        self.end_of_training = Some(Box::new(f));
        self
    }

    /// Receives the point a follow-up run should resume from.
    pub fn on_interrupt(
        mut self,
        f: impl FnMut(&mut P, ResumePoint) -> Result<(), MlError> + 'h,
    ) -> Self {
        self.interrupt = Some(Box::new(f));
        self
    }

    pub(crate) fn start_of_training(&mut self, parts: &mut P) -> Result<(), MlError> {
        self.start_of_training.as_mut().map_or(Ok(()), |f| f(parts))
    }

    pub(crate) fn start_of_epoch(&mut self, parts: &mut P, epoch: usize) -> Result<(), MlError> {
        self.start_of_epoch.as_mut().map_or(Ok(()), |f| f(parts, epoch))
    }

    pub(crate) fn start_of_batch(
        &mut self,
        parts: &mut P,
        epoch: usize,
        batch: usize,
        data: &B,
    ) -> Result<(), MlError> {
        self.start_of_batch
            .as_mut()
            .map_or(Ok(()), |f| f(parts, epoch, batch, data))
    }

    pub(crate) fn end_of_batch(
        &mut self,
        parts: &mut P,
        epoch: usize,
        batch: usize,
        data: &B,
    ) -> Result<(), MlError> {
        self.end_of_batch
            .as_mut()
            .map_or(Ok(()), |f| f(parts, epoch, batch, data))
    }

    pub(crate) fn end_of_epoch(&mut self, parts: &mut P, epoch: usize) -> Result<(), MlError> {
        self.end_of_epoch.as_mut().map_or(Ok(()), |f| f(parts, epoch))
    }

    pub(crate) fn end_of_training(&mut self, parts: &mut P) -> Result<(), MlError> {
        self.end_of_training.as_mut().map_or(Ok(()), |f| f(parts))
    }

    pub(crate) fn interrupt(&mut self, parts: &mut P, resume: ResumePoint) -> Result<(), MlError> {
        self.interrupt.as_mut().map_or(Ok(()), |f| f(parts, resume))
    }
}
