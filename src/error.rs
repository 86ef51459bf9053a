//! Error types for bridge-audio.
//!
//! Errors are split into two categories:
//! - **Control-plane errors** ([`BridgeError`]): Returned from the builder and
//!   from registry/lifecycle calls. Builder errors are fatal; transport-open
//!   errors are transient and retryable.
//! - **Transport faults** ([`TransportError`]): Raised by [`AudioTransport`]
//!   implementations. At runtime these degrade to silence and are surfaced via
//!   [`EventCallback`](crate::EventCallback) rather than unwinding the audio
//!   path.
//!
//! [`AudioTransport`]: crate::AudioTransport

use crate::producer::ProducerId;

/// Errors returned by [`AudioBridgeBuilder::start()`] and the bridge's
/// control-plane operations.
///
/// Configuration variants indicate the bridge cannot be created and must fail
/// fast. [`BridgeError::TransportOpen`] is different: it reports a failed
/// connection attempt, which is expected to be transient. The bridge stays
/// usable (spooling and dropping blocks) and the open is retried on the next
/// layout change or an explicit [`AudioBridge::reconnect`] call.
///
/// [`AudioBridgeBuilder::start()`]: crate::AudioBridgeBuilder::start
/// [`AudioBridge::reconnect`]: crate::AudioBridge::reconnect
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The configured block size does not match the transport's fixed block
    /// size. Block size is agreed with the host and the external server out
    /// of band; a disagreement cannot be papered over per block.
    #[error("block size mismatch: configured {configured} frames, transport expects {transport}")]
    BlockSizeMismatch {
        /// Block size from [`BridgeConfig`](crate::BridgeConfig).
        configured: usize,
        /// Block size reported by the transport.
        transport: usize,
    },

    /// The configured block size is zero.
    #[error("block size must be nonzero")]
    ZeroBlockSize,

    /// An operation referenced a producer id that is not registered.
    #[error("unknown {id}")]
    UnknownProducer {
        /// The id that was not found.
        id: ProducerId,
    },

    /// No builder transport was supplied.
    #[error("no transport configured - pass one to transport() before calling start()")]
    NoTransportConfigured,

    /// The transport could not be opened.
    ///
    /// Non-fatal: the connection manager stays closed, submissions spool and
    /// drop, and the open is retried on the next layout change or
    /// `reconnect()`.
    #[error("transport open failed: {source}")]
    TransportOpen {
        /// The underlying transport fault.
        #[source]
        source: TransportError,
    },
}

/// Faults raised by [`AudioTransport`](crate::AudioTransport) and
/// [`TransportLink`](crate::TransportLink) implementations.
///
/// Open faults propagate as [`BridgeError::TransportOpen`]. Write and read
/// faults on a live link are recoverable: a failed write loses that block
/// (reported as a [`BridgeEvent`](crate::BridgeEvent)), a failed read
/// substitutes silence.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established (e.g., client name collision,
    /// server not running, resource exhaustion).
    #[error("open failed: {reason}")]
    OpenFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The link is no longer connected to the server.
    #[error("transport closed")]
    Closed,

    /// A block write was rejected by the server side.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// A block read was rejected by the server side.
    #[error("read failed: {reason}")]
    ReadFailed {
        /// Description of what went wrong.
        reason: String,
    },
}

impl TransportError {
    /// Creates an open-failed error with the given reason.
    pub fn open_failed(reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            reason: reason.into(),
        }
    }

    /// Creates a write-failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Creates a read-failed error with the given reason.
    pub fn read_failed(reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            reason: reason.into(),
        }
    }
}

impl From<TransportError> for BridgeError {
    fn from(source: TransportError) -> Self {
        Self::TransportOpen { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::BlockSizeMismatch {
            configured: 512,
            transport: 1024,
        };
        assert_eq!(
            err.to_string(),
            "block size mismatch: configured 512 frames, transport expects 1024"
        );
    }

    #[test]
    fn test_unknown_producer_display() {
        let err = BridgeError::UnknownProducer {
            id: ProducerId::new(7),
        };
        assert_eq!(err.to_string(), "unknown producer#7");
    }

    #[test]
    fn test_transport_error_open_failed() {
        let err = TransportError::open_failed("name already taken");
        assert_eq!(err.to_string(), "open failed: name already taken");
    }

    #[test]
    fn test_transport_error_wraps_into_bridge_error() {
        let err: BridgeError = TransportError::open_failed("server down").into();
        assert!(err.to_string().contains("server down"));
    }
}
