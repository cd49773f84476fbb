//! # toolbox-ml: dataset splitting and a hookable training loop
//!
//! Convenience layer over whatever ML framework supplies the model,
//! optimiser, loss and tensors:
//! - [`data`]: datasets that split recursively into named subsets, with
//!   optional shuffling, CSV / folder loading and a simple batch loader.
//! - [`training`]: an epoch/batch loop with lifecycle hooks and
//!   cooperative cancellation that reports where to resume.

pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod training;

pub use config::{ConfigOverrides, ToolboxConfig, load_config};
pub use data::{Dataset, Split, SplitOptions};
pub use error::MlError;
pub use training::{Hooks, ResumePoint, TrainLoop, TrainingInterrupted};
