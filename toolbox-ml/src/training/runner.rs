//! The training loop driver.
//!
//! The loop owns the collaborators (model, criterion, optimiser, loaders)
//! but never computes anything itself: all work happens in [`Hooks`]. It
//! checks a [`CancellationToken`] before every epoch and every batch, so a
//! Ctrl-C stops the run on a clean boundary with a known [`ResumePoint`].

use crate::config::{SgdSettings, TrainLoopConfig};
use crate::data::loader::BatchSource;
use crate::error::MlError;
use crate::training::hooks::Hooks;
use crate::training::interrupt::{ResumePoint, TrainingInterrupted};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Builds an optimiser for a model when none was supplied.
pub trait DefaultOptimiser<M>: Sized {
    fn from_sgd(model: &M, settings: &SgdSettings) -> Self;
}

/// The settings themselves serve as an optimiser description.
impl<M> DefaultOptimiser<M> for SgdSettings {
    fn from_sgd(_model: &M, settings: &SgdSettings) -> Self {
        *settings
    }
}

/// Everything hooks can reach while the loop runs.
#[derive(Debug)]
pub struct TrainingParts<M, C, O = SgdSettings, V = ()> {
    pub model: M,
    pub criterion: C,
    pub optimiser: O,
    pub val_loader: Option<V>,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: ResumePoint,
    pub epochs_completed: usize,
    pub batches_run: usize,
    pub batches_skipped: usize,
}

/// Builder for [`TrainLoop`]. Model, train loader and criterion are required.
pub struct TrainLoopBuilder<M, L, C, O = SgdSettings, V = ()> {
    model: Option<M>,
    train_loader: Option<L>,
    criterion: Option<C>,
    optimiser: Option<O>,
    val_loader: Option<V>,
    config: TrainLoopConfig,
}

impl<M, L, C> TrainLoopBuilder<M, L, C> {
    pub fn new() -> Self {
        Self {
            model: None,
            train_loader: None,
            criterion: None,
            optimiser: None,
            val_loader: None,
            config: TrainLoopConfig::default(),
        }
    }
}

impl<M, L, C> Default for TrainLoopBuilder<M, L, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, L, C, O, V> TrainLoopBuilder<M, L, C, O, V> {
    pub fn model(mut self, model: M) -> Self {
        self.model = Some(model);
        self
    }

    pub fn train_loader(mut self, loader: L) -> Self {
        self.train_loader = Some(loader);
        self
    }

    pub fn criterion(mut self, criterion: C) -> Self {
        self.criterion = Some(criterion);
        self
    }

    pub fn optimiser<O2>(self, optimiser: O2) -> TrainLoopBuilder<M, L, C, O2, V> {
        TrainLoopBuilder {
            model: self.model,
            train_loader: self.train_loader,
            criterion: self.criterion,
            optimiser: Some(optimiser),
            val_loader: self.val_loader,
            config: self.config,
        }
    }

    pub fn val_loader<V2>(self, loader: V2) -> TrainLoopBuilder<M, L, C, O, V2> {
        TrainLoopBuilder {
            model: self.model,
            train_loader: self.train_loader,
            criterion: self.criterion,
            optimiser: self.optimiser,
            val_loader: Some(loader),
            config: self.config,
        }
    }

    pub fn config(mut self, config: TrainLoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn epochs(mut self, nr_of_epochs: usize) -> Self {
        self.config.nr_of_epochs = nr_of_epochs;
        self
    }

    /// Build the loop, creating the optimiser from `config.sgd` if none was set.
    pub fn build(self) -> Result<TrainLoop<M, L, C, O, V>, MlError>
    where
        O: DefaultOptimiser<M>,
    {
        self.build_with(O::from_sgd)
    }

    /// Build the loop, calling `fallback` if no optimiser was set.
    pub fn build_with(
        self,
        fallback: impl FnOnce(&M, &SgdSettings) -> O,
    ) -> Result<TrainLoop<M, L, C, O, V>, MlError> {
        let model = self
            .model
            .ok_or_else(|| MlError::config("Model not specified."))?;
        let train_loader = self
            .train_loader
            .ok_or_else(|| MlError::config("Train_loader not specified."))?;
        let criterion = self
            .criterion
            .ok_or_else(|| MlError::config("Criterion not specified."))?;
        let optimiser = match self.optimiser {
            Some(optimiser) => optimiser,
            None => {
                debug!(
                    lr = self.config.sgd.lr,
                    momentum = self.config.sgd.momentum,
                    "No optimiser given, using SGD defaults"
                );
                fallback(&model, &self.config.sgd)
            }
        };

        Ok(TrainLoop {
            parts: TrainingParts {
                model,
                criterion,
                optimiser,
                val_loader: self.val_loader,
            },
            train_loader,
            config: self.config,
            cancellation: CancellationToken::new(),
        })
    }
}

/// A configurable epoch/batch loop driven by [`Hooks`].
pub struct TrainLoop<M, L, C, O = SgdSettings, V = ()> {
    parts: TrainingParts<M, C, O, V>,
    train_loader: L,
    config: TrainLoopConfig,
    cancellation: CancellationToken,
}

impl<M, L, C> TrainLoop<M, L, C> {
    pub fn builder() -> TrainLoopBuilder<M, L, C> {
        TrainLoopBuilder::new()
    }
}

impl<M, L, C, O, V> TrainLoop<M, L, C, O, V>
where
    L: BatchSource,
{
    pub fn config(&self) -> &TrainLoopConfig {
        &self.config
    }

    pub fn parts(&self) -> &TrainingParts<M, C, O, V> {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut TrainingParts<M, C, O, V> {
        &mut self.parts
    }

    pub fn into_parts(self) -> (TrainingParts<M, C, O, V>, L) {
        (self.parts, self.train_loader)
    }

    /// An empty set of hooks typed for this loop.
    pub fn hooks<'h>(&self) -> Hooks<'h, TrainingParts<M, C, O, V>, L::Batch> {
        Hooks::new()
    }

    /// Token checked before every epoch and batch. Cancel it to stop the run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Install a fresh token so an interrupted loop can be resumed.
    pub fn reset_cancellation(&mut self) {
        self.cancellation = CancellationToken::new();
    }

    /// Cancel this loop on Ctrl-C.
    ///
    /// Spawns a task on the current tokio runtime and must be called from
    /// within one. The task ends once the token is cancelled.
    pub fn listen_for_interrupt(&self) -> tokio::task::JoinHandle<()> {
        let token = self.cancellation.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        warn!("Interrupt received, stopping at the next batch boundary");
                        token.cancel();
                    }
                    Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
                },
                _ = token.cancelled() => {}
            }
        })
    }

    /// Run from the first epoch and batch.
    pub fn run(
        &mut self,
        hooks: &mut Hooks<'_, TrainingParts<M, C, O, V>, L::Batch>,
    ) -> Result<RunSummary, MlError> {
        self.run_from(hooks, ResumePoint::START)
    }

    /// Run starting at `start`, skipping the batches before `start.batch`
    /// in the first epoch.
    ///
    /// The loader is positioned at `start.epoch` first, so a seeded source
    /// yields the same batches it would have in an uninterrupted run.
    ///
    /// `on_start_of_training` only fires when `start` is the very start. A
    /// run cancelled before its first epoch reports `(1, 1)` as its resume
    /// point, so resuming it fires `on_start_of_training` again. On
    /// cancellation `on_interrupt` fires, `on_end_of_training` does not, and
    /// [`MlError::Interrupted`] is returned.
    pub fn run_from(
        &mut self,
        hooks: &mut Hooks<'_, TrainingParts<M, C, O, V>, L::Batch>,
        start: ResumePoint,
    ) -> Result<RunSummary, MlError> {
        if start.epoch == 0 || start.batch == 0 {
            return Err(MlError::invalid_input(format!(
                "epochs and batches are counted from 1, got {start}"
            )));
        }

        let Self {
            parts,
            train_loader,
            config,
            cancellation,
        } = self;
        let mut summary = RunSummary {
            started_at: start,
            epochs_completed: 0,
            batches_run: 0,
            batches_skipped: 0,
        };

        info!(
            epochs = config.nr_of_epochs,
            start_epoch = start.epoch,
            start_batch = start.batch,
            "Starting training"
        );

        if start.is_start() {
            hooks.start_of_training(parts)?;
        }
        train_loader.seek_epoch(start.epoch);

        for epoch in start.epoch..=config.nr_of_epochs {
            if cancellation.is_cancelled() {
                return interrupt(hooks, parts, TrainingInterrupted::new(epoch, 0));
            }
            hooks.start_of_epoch(parts, epoch)?;

            let first_batch = if epoch == start.epoch { start.batch } else { 1 };
            for (batch, data) in (1..).zip(train_loader.epoch()) {
                if batch < first_batch {
                    trace!(epoch, batch, "Skipped batch");
                    summary.batches_skipped += 1;
                    continue;
                }
                if cancellation.is_cancelled() {
                    return interrupt(hooks, parts, TrainingInterrupted::new(epoch, batch));
                }

                hooks.start_of_batch(parts, epoch, batch, &data)?;
                hooks.end_of_batch(parts, epoch, batch, &data)?;
                summary.batches_run += 1;

                if config.log_every > 0 && batch % config.log_every == 0 {
                    info!(epoch, batch, "Training progress");
                }
            }

            hooks.end_of_epoch(parts, epoch)?;
            summary.epochs_completed += 1;
            debug!(epoch, "Finished epoch");
        }

        hooks.end_of_training(parts)?;
        info!(
            epochs_completed = summary.epochs_completed,
            batches_run = summary.batches_run,
            "Training finished"
        );
        Ok(summary)
    }
}

fn interrupt<P, B>(
    hooks: &mut Hooks<'_, P, B>,
    parts: &mut P,
    interrupted: TrainingInterrupted,
) -> Result<RunSummary, MlError> {
    warn!(
        epoch = interrupted.epoch,
        batch = interrupted.batch,
        "Training interrupted"
    );
    hooks.interrupt(parts, interrupted.resume_point())?;
    Err(interrupted.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Model {
        steps: Vec<(usize, usize, u32)>,
    }

    #[derive(Debug)]
    struct Mse;

    fn simple_loop(epochs: usize, batches: u32) -> TrainLoop<Model, Vec<u32>, Mse> {
        TrainLoop::builder()
            .model(Model::default())
            .train_loader((1..=batches).collect())
            .criterion(Mse)
            .epochs(epochs)
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_optimiser_uses_sgd_settings() {
        let lp = simple_loop(1, 1);
        assert_eq!(lp.parts().optimiser, SgdSettings { lr: 0.00005, momentum: 0.9 });
        assert_eq!(lp.config().nr_of_epochs, 1);
        assert!(lp.parts().val_loader.is_none());
    }

    #[test]
    fn test_default_epochs() {
        let lp: TrainLoop<Model, Vec<u32>, Mse> = TrainLoop::builder()
            .model(Model::default())
            .train_loader(vec![1])
            .criterion(Mse)
            .build()
            .unwrap();
        assert_eq!(lp.config().nr_of_epochs, 100);
    }

    #[test]
    fn test_missing_parts() {
        let err = TrainLoopBuilder::<Model, Vec<u32>, Mse>::new()
            .train_loader(vec![1])
            .criterion(Mse)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Configuration error: Model not specified.");

        let err = TrainLoopBuilder::<Model, Vec<u32>, Mse>::new()
            .model(Model::default())
            .criterion(Mse)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().ends_with("Train_loader not specified."));

        let err = TrainLoopBuilder::<Model, Vec<u32>, Mse>::new()
            .model(Model::default())
            .train_loader(vec![1])
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().ends_with("Criterion not specified."));
    }

    #[test]
    fn test_explicit_optimiser_and_val_loader() {
        let lp = TrainLoop::<Model, Vec<u32>, Mse>::builder()
            .model(Model::default())
            .train_loader(vec![1, 2])
            .criterion(Mse)
            .optimiser("adam")
            .val_loader(vec![9u32])
            .build_with(|_, _| unreachable!("optimiser was given"))
            .unwrap();
        assert_eq!(lp.parts().optimiser, "adam");
        assert_eq!(lp.parts().val_loader.as_deref(), Some(&[9u32][..]));
    }

    #[test]
    fn test_hooks_see_every_batch() {
        let mut lp = simple_loop(2, 3);
        let mut hooks = lp.hooks().on_end_of_batch(|parts, epoch, batch, data| {
            parts.model.steps.push((epoch, batch, *data));
            Ok(())
        });
        let summary = lp.run(&mut hooks).unwrap();
        drop(hooks);

        assert_eq!(summary.epochs_completed, 2);
        assert_eq!(summary.batches_run, 6);
        assert_eq!(
            lp.parts().model.steps,
            vec![(1, 1, 1), (1, 2, 2), (1, 3, 3), (2, 1, 1), (2, 2, 2), (2, 3, 3)]
        );
    }

    #[test]
    fn test_cancel_before_first_epoch_restarts_from_scratch() {
        let mut lp = simple_loop(1, 2);
        let mut starts = 0;
        let mut hooks = lp.hooks().on_start_of_training(|_| {
            starts += 1;
            Ok(())
        });

        lp.cancel();
        let err = lp.run(&mut hooks).unwrap_err();
        let resume = err.as_interrupted().unwrap().resume_point();
        assert_eq!(resume, ResumePoint::START);

        lp.reset_cancellation();
        lp.run_from(&mut hooks, resume).unwrap();
        drop(hooks);
        assert_eq!(starts, 2);
    }

    #[test]
    fn test_zero_start_rejected() {
        let mut lp = simple_loop(1, 1);
        let mut hooks = lp.hooks();
        assert!(matches!(
            lp.run_from(&mut hooks, ResumePoint::new(0, 1)),
            Err(MlError::InvalidInput(_))
        ));
    }
}
