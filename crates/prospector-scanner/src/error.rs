//! Scanner error types.

use thiserror::Error;

/// Errors that stop a discovery cycle.
///
/// Per-URL and per-provider failures never surface here; they are counted
/// and logged. Only failures to open or close a run record propagate.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Store failure while opening or closing a run
    #[error("store error: {0}")]
    Store(#[from] prospector_db::StoreError),
}

/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_convert() {
        let err: ScanError = prospector_db::StoreError::RunClosed("r1".into()).into();
        assert!(err.to_string().contains("r1"));
    }
}
