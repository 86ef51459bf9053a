//! Runtime events for monitoring bridge health.
//!
//! Events are non-fatal notifications about bridge behavior. The bridge
//! continues running after events are emitted - they're for logging/metrics,
//! not error handling.

use std::sync::Arc;

use crate::producer::ProducerId;

/// Runtime events emitted during aggregation.
///
/// These are informational events, not errors. The bridge continues running
/// after any event is emitted. Use the [`EventCallback`] to log these or
/// update metrics.
///
/// Variants marked *real-time path* can be emitted from inside the host's
/// audio callback; they carry only `Copy` payloads so emission never
/// allocates, and handlers must not block.
///
/// # Example
///
/// ```
/// use bridge_audio::BridgeEvent;
///
/// fn handle_event(event: BridgeEvent) {
///     match event {
///         BridgeEvent::TransportOpened { inputs, outputs } => {
///             eprintln!("transport up: {inputs} in / {outputs} out");
///         }
///         BridgeEvent::TransportOpenFailed { reason } => {
///             eprintln!("transport open failed: {reason}");
///         }
///         BridgeEvent::BlockDropped { producers } => {
///             eprintln!("dropped a block from {producers} producers");
///         }
///         other => eprintln!("bridge event: {other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A transport link was opened (initially or after renegotiation).
    TransportOpened {
        /// Input channel count the link was opened with.
        inputs: usize,
        /// Output channel count the link was opened with.
        outputs: usize,
    },

    /// The transport link was closed.
    ///
    /// Emitted for explicit closes and for the close half of a
    /// renegotiation.
    TransportClosed,

    /// A transport open attempt failed.
    ///
    /// The bridge stays in the closed state: submissions spool and complete
    /// blocks are dropped until a later layout change or
    /// [`AudioBridge::reconnect`](crate::AudioBridge::reconnect) succeeds.
    TransportOpenFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The channel layout changed (producer added/removed or a channel
    /// count updated).
    ///
    /// Any partially aggregated block for the old layout was discarded.
    LayoutChanged {
        /// Number of registered producers in the new layout.
        producers: usize,
        /// Total channel count of the new layout.
        total_channels: usize,
    },

    /// A producer submitted twice within one block (*real-time path*).
    ///
    /// Resolved as last write wins: the later sub-buffer replaces the
    /// earlier one and the block still flushes once.
    DuplicateSubmission {
        /// The producer that double-submitted.
        id: ProducerId,
    },

    /// A completed block was dropped because no transport was open
    /// (*real-time path*).
    BlockDropped {
        /// Number of producers whose sub-buffers were discarded.
        producers: usize,
    },

    /// A block write to the transport failed (*real-time path*).
    ///
    /// The block is lost; details are logged via `tracing`. The link stays
    /// installed, so a persistent fault shows up as repeated events.
    WriteFailed,

    /// Spooled sub-buffers were replayed into a freshly opened transport's
    /// mix buffer.
    SpoolReplayed {
        /// Number of producers whose spooled data was replayed.
        producers: usize,
    },
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via [`AudioBridgeBuilder::on_event()`] to
/// receive notifications about transport lifecycle, layout changes, and
/// degraded blocks.
///
/// Some events are emitted from the host's real-time audio thread; the
/// callback must therefore be cheap and must not block or allocate
/// unboundedly.
///
/// [`AudioBridgeBuilder::on_event()`]: crate::AudioBridgeBuilder::on_event
///
/// # Example
///
/// ```ignore
/// use bridge_audio::AudioBridge;
///
/// let bridge = AudioBridge::builder()
///     .transport(transport)
///     .on_event(|event| {
///         tracing::warn!(?event, "bridge event");
///     })
///     .start()?;
/// ```
pub type EventCallback = Arc<dyn Fn(BridgeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// This is a convenience function for creating event callbacks without
/// manually wrapping in `Arc`.
///
/// # Example
///
/// ```
/// use bridge_audio::{event_callback, BridgeEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(BridgeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_event_debug() {
        let event = BridgeEvent::TransportOpened {
            inputs: 2,
            outputs: 4,
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("TransportOpened"));
        assert!(debug.contains('4'));
    }

    #[test]
    fn test_bridge_event_clone() {
        let event = BridgeEvent::TransportOpenFailed {
            reason: "name collision".to_string(),
        };
        let cloned = event.clone();
        if let BridgeEvent::TransportOpenFailed { reason } = cloned {
            assert_eq!(reason, "name collision");
        } else {
            panic!("Expected TransportOpenFailed variant");
        }
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(BridgeEvent::DuplicateSubmission {
            id: ProducerId::new(0),
        });
        assert!(called.load(Ordering::SeqCst));
    }
}
