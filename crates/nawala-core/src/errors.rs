use std::time::Duration;

/// Core error type for the domain guard.
///
/// Adapter crates map their specific errors into this type so the monitor and
/// command loops can report failures consistently (notify + skip the unit).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
