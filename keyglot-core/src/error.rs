use thiserror::Error;

/// Errors surfaced by the core layout/classification components.
///
/// Every variant here is non-fatal to the caller: a pipeline that
/// receives one of these falls back to an embedded default and keeps
/// running, per the error-handling design (no component halts the
/// host process).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("layout data file invalid: {0}")]
    InvalidLayoutData(String),

    #[error("unknown layout id: {0}")]
    UnknownLayout(String),

    #[error("user dictionary io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("user dictionary record malformed: {0}")]
    MalformedRecord(String),
}
