use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("store data unavailable at {path}: {reason}")]
    DataUnavailable { path: PathBuf, reason: String },

    #[error("no store data: the table has zero rows")]
    EmptyDataset,

    #[error("unknown cluster category: {0}")]
    UnknownCategory(String),

    #[error("series length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl DashboardError {
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DashboardError::DataUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;
