use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Market data could not be obtained. The iteration is skipped.
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    /// The exchange could not report position state.
    #[error("Position query failed: {0}")]
    QueryFailed(String),

    /// The exchange could not execute an order or close.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Invalid or missing configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A risk sizer produced levels that break the stop/target contract.
    #[error("Risk sizing error: {0}")]
    RiskSizing(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Re-tag a transport-level error as a data failure.
    pub fn into_data_unavailable(self) -> Self {
        match self {
            e @ Error::DataUnavailable(_) => e,
            other => Error::DataUnavailable(other.to_string()),
        }
    }

    /// Re-tag a transport-level error as a position query failure.
    pub fn into_query_failed(self) -> Self {
        match self {
            e @ Error::QueryFailed(_) => e,
            other => Error::QueryFailed(other.to_string()),
        }
    }

    /// Re-tag a transport-level error as an execution failure.
    pub fn into_execution_failed(self) -> Self {
        match self {
            e @ Error::ExecutionFailed(_) => e,
            other => Error::ExecutionFailed(other.to_string()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
