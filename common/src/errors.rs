// Error handling framework for the scheduling optimizer

use thiserror::Error;

/// Optimizer errors surfaced to callers
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Invalid constraints: {0}")]
    InvalidConstraints(String),

    /// Recovered internally (zero profile / fallback schedule); never returned
    /// from a public allocation entry point.
    #[error("Analytics unavailable: {0}")]
    AnalyticsUnavailable(String),

    #[error("No available slot for item '{item_id}' within {day_steps} day steps")]
    SlotSearchExhausted { item_id: String, day_steps: u32 },

    #[error("No whole hour falls inside the preferred time ranges")]
    NoEligibleHours,

    #[error("Local time {0} cannot be resolved in the target timezone")]
    UnresolvableLocalTime(String),

    #[error("Collaborator call failed: {0}")]
    Collaborator(#[from] ProviderError),
}

/// Time parsing errors for `HH:mm` values and IANA zone names
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("Invalid time of day '{value}': expected HH:mm")]
    InvalidTimeOfDay { value: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Errors raised by external collaborators (analytics, content and schedule stores)
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Filesystem error: {0}")]
    FileSystemError(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider call timed out after {0} ms")]
    Timeout(u64),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl From<TimeParseError> for OptimizerError {
    fn from(err: TimeParseError) -> Self {
        OptimizerError::InvalidConstraints(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidJson(err.to_string())
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ProviderError::NotFound(err.to_string()),
            _ => ProviderError::FileSystemError(err.to_string()),
        }
    }
}
