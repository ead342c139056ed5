// parley-relay-lib/src/error.rs

//! Central error type.
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum RelayError {
    /// The directory actor has shut down
    #[error("directory unavailable")]
    DirectoryClosed,

    /// Room provisioning failed; the pending start-call is rolled back
    #[error("room provisioning failed: {0}")]
    Provision(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RelayError::DirectoryClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_error_display() {
        assert_eq!(RelayError::DirectoryClosed.to_string(), "directory unavailable");
        assert_eq!(
            RelayError::Provision("upstream timeout".to_string()).to_string(),
            "room provisioning failed: upstream timeout"
        );
    }

    #[test]
    fn test_send_error_conversion() {
        let (tx, rx) = mpsc::unbounded_channel::<u8>();
        drop(rx);
        let err: RelayError = tx.send(1).unwrap_err().into();
        assert!(matches!(err, RelayError::DirectoryClosed));
    }
}
