//! Error kinds surfaced by the bridge

use std::path::PathBuf;

/// Faults raised while building the bridge or forwarding a call
///
/// A callback arriving with no delegate registered is not an error and has no
/// variant here; it is answered with an empty response.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The native library could not be located or loaded
    #[error("failed to load native library {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// The one-time native setup failed
    #[error("native initialization failed: {0}")]
    Init(String),

    /// A single outbound call faulted on the native side
    #[error("native call `{method}` failed: {reason}")]
    Call { method: String, reason: String },
}

impl BridgeError {
    pub(crate) fn call(method: &str, reason: impl Into<String>) -> Self {
        Self::Call {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from building the singleton (kinds a and b)
    pub fn is_construction(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Init(_))
    }
}

/// Result alias used throughout the crate
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_kinds() {
        let load = BridgeError::Load {
            path: PathBuf::from("/missing/libx.so"),
            reason: "not found".to_string(),
        };
        assert!(load.is_construction());
        assert!(BridgeError::Init("boom".to_string()).is_construction());
        assert!(!BridgeError::call("ping", "fault").is_construction());
    }

    #[test]
    fn test_messages_name_the_cause() {
        let err = BridgeError::call("ping", "native fault");
        assert_eq!(err.to_string(), "native call `ping` failed: native fault");

        let err = BridgeError::Load {
            path: PathBuf::from("libx.so"),
            reason: "no such file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to load native library libx.so: no such file"
        );
    }
}
