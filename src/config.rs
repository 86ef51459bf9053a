//! Configuration types for the bridge.

/// Frames per block exchanged with the external server.
///
/// Block size is agreed out of band between the host and the server; the
/// bridge neither splits nor merges blocks. A transport reporting a
/// different block size fails the builder with
/// [`BridgeError::BlockSizeMismatch`](crate::BridgeError::BlockSizeMismatch).
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Input channels read back from the external server by default.
///
/// The capture side of the connection does not depend on the producer
/// population, so it is fixed at configuration time rather than
/// renegotiated.
pub const DEFAULT_INPUT_CHANNELS: usize = 2;

/// Configuration for bridge behavior.
///
/// Use [`BridgeConfig::default()`] for sensible defaults, or customize as
/// needed.
///
/// # Example
///
/// ```
/// use bridge_audio::BridgeConfig;
///
/// let config = BridgeConfig {
///     input_channels: 8,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Frames per block, for every producer and for the transport.
    ///
    /// Must equal the transport's fixed block size exactly; the builder
    /// fails fast on a mismatch rather than resynchronizing per block.
    /// Default: [`DEFAULT_BLOCK_SIZE`]
    pub block_size: usize,

    /// Channels opened on the transport's input (server-to-host) side.
    ///
    /// Producers read their own channels back out of this block via
    /// [`AudioBridge::pull_input`](crate::AudioBridge::pull_input); channels
    /// at or beyond this count read as silence.
    /// Default: [`DEFAULT_INPUT_CHANNELS`]
    pub input_channels: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            input_channels: DEFAULT_INPUT_CHANNELS,
        }
    }
}
