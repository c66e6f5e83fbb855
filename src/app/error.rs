use thiserror::Error;

use crate::adapters::management_store::StoreError;
use crate::app::runtime::PipelineError;

/// Exit status asking the scheduler to try again later (`EX_TEMPFAIL`).
pub const EXIT_TEMPORARY_FAILURE: i32 = 75;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to open management store: {0}")]
    Store(#[source] StoreError),
    #[error("battery collection failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to render report: {0}")]
    Report(String),
}

impl AppError {
    pub fn logging_init<E: std::fmt::Display>(error: E) -> Self {
        Self::LoggingInit(error.to_string())
    }

    pub fn config<E: std::fmt::Display>(error: E) -> Self {
        Self::Config(error.to_string())
    }

    pub fn store(error: StoreError) -> Self {
        Self::Store(error)
    }

    pub fn report<E: std::fmt::Display>(error: E) -> Self {
        Self::Report(error.to_string())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Pipeline(error) if error.is_temporary() => EXIT_TEMPORARY_FAILURE,
            _ => 1,
        }
    }
}
