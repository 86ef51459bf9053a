//! # bridge-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Channel aggregation between per-instance audio producers and one shared
//! audio server connection.
//!
//! `bridge-audio` routes the output of many plugin instances through a
//! single external connection: producers register with a channel count,
//! each audio cycle they submit one interleaved sub-buffer, and the bridge
//! merges them into one wide block written to the server. Registration
//! changes renegotiate the connection; channel offsets stay stable in
//! registration order.
//!
//! ## Quick Start
//!
//! ```rust
//! use bridge_audio::{AudioBridge, MockTransport};
//!
//! # fn main() -> Result<(), bridge_audio::BridgeError> {
//! let bridge = AudioBridge::builder()
//!     .transport(MockTransport::new())
//!     .on_event(|e| tracing::debug!(?e, "bridge event"))
//!     .start()?;
//!
//! // One producer per plugin instance.
//! let synth = bridge.register_producer(2);
//! let sampler = bridge.register_producer(1);
//! assert_eq!(bridge.total_channels(), 3);
//!
//! // Every cycle each producer submits its interleaved sub-buffer; the
//! // merged block is written once all have reported.
//! let frames = bridge.block_size();
//! bridge.submit(synth, &vec![0.0; frames * 2]);
//! bridge.submit(sampler, &vec![0.0; frames]);
//! assert_eq!(bridge.stats().blocks_flushed, 1);
//!
//! bridge.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Audio threads**: [`submit`](AudioBridge::submit) and
//!   [`pull_input`](AudioBridge::pull_input) do bounded work under a short
//!   lock and never allocate
//! - **Control thread**: registration and renegotiation; all slow transport
//!   work (connect, close, buffer allocation) happens here
//! - **Transport**: one connection to the external server at a time,
//!   reopened whenever the total channel count changes; sub-buffers
//!   submitted while it is down are spooled and replayed
//!
//! This design keeps the host's audio callbacks real-time safe while
//! producers come and go at any moment.

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// unwrap/expect stay confined to tests
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod adapter;
mod bridge;
mod config;
mod engine;
mod error;
mod event;
mod producer;
mod registry;
mod transport;

pub use adapter::{apply_output_gain, registered_channels, shape_into, shaped_len, ChannelMode};
pub use bridge::{AudioBridge, AudioBridgeBuilder, BridgeStats};
pub use config::{BridgeConfig, DEFAULT_BLOCK_SIZE, DEFAULT_INPUT_CHANNELS};
pub use error::{BridgeError, TransportError};
pub use event::{event_callback, BridgeEvent, EventCallback};
pub use producer::ProducerId;
pub use registry::{ChannelLayout, ChannelRegistry, LayoutSlot};
pub use transport::{AudioTransport, MockTransport, TransportLink};
