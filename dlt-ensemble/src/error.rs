use std::time::Duration;

use dlt_db::models::Pool;
use dlt_db::DbError;
use thiserror::Error;

/// Failures local to one scorer. The pipeline contains them and carries on
/// with the surviving scorers.
#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("{scorer}: insufficient history ({have} draws, need {need})")]
    InsufficientData {
        scorer: String,
        have: usize,
        need: usize,
    },

    #[error("{0}: predict called before a successful train")]
    NotTrained(String),

    #[error("{scorer}: degenerate {pool} score vector, falling back to uniform")]
    NumericDegenerate { scorer: String, pool: Pool },

    #[error("{scorer}: exceeded its {budget:?} budget")]
    Timeout { scorer: String, budget: Duration },

    #[error("{0}: worker aborted before reporting")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum SlipError {
    #[error("invalid slip shape: {0}")]
    InvalidSlipShape(String),
}

/// Failures surfaced by the orchestrator. Anything that would corrupt
/// persisted state aborts the cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("insufficient history before {period}: {have} draws, need {need}")]
    InsufficientData {
        period: String,
        have: usize,
        need: usize,
    },

    #[error("no draw recorded for period {0}")]
    MissingDraw(String),

    #[error("no prediction snapshot for period {0}")]
    MissingSnapshot(String),

    #[error(transparent)]
    InvalidSlipShape(#[from] SlipError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] DbError),
}

impl PipelineError {
    /// 1 for recoverable failures, 2 when the store or configuration is unusable.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Persistence(_) | PipelineError::Configuration(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
