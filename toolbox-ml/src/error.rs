//! Error types for the toolbox-ml crate.

use crate::training::interrupt::TrainingInterrupted;
use thiserror::Error;

/// Top-level error type for dataset and training operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("{0}")]
    NotEnoughData(String),

    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    #[error("Duplicate subset: {0}")]
    DuplicateSubset(String),

    #[error("Dataset '{0}' is already split into subsets")]
    AlreadySplit(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error(transparent)]
    Interrupted(#[from] TrainingInterrupted),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn invalid_split(msg: impl Into<String>) -> Self {
        Self::InvalidSplit(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// The interruption details, when this error stopped a training run.
    pub fn as_interrupted(&self) -> Option<&TrainingInterrupted> {
        match self {
            Self::Interrupted(interrupted) => Some(interrupted),
            _ => None,
        }
    }
}
