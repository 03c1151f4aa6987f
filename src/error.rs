// src/error.rs
//! Run-level errors. Anything in here aborts a pipeline run; per-item and
//! per-channel failures never reach this type.

use thiserror::Error;

use crate::pipeline::RunSummary;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or incomplete configuration. Raised before any external call.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("all {0} collectors failed; nothing to process")]
    AllCollectorsFailed(usize),

    #[error("seen-id store error: {0}")]
    SeenStore(#[source] anyhow::Error),

    /// The digest went out but the seen set could not be persisted, so the
    /// next run may repeat these items. Carries the completed run's summary.
    #[error("delivered to {} channel(s) but seen ids were not saved: {source}", .summary.delivered())]
    SeenSave {
        summary: Box<RunSummary>,
        #[source]
        source: anyhow::Error,
    },

    #[error("another run is in progress: {0}")]
    Lock(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Summary of a run that finished delivery before failing.
    pub fn run_summary(&self) -> Option<&RunSummary> {
        match self {
            Self::SeenSave { summary, .. } => Some(&**summary),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
