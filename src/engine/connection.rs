//! Transport lifecycle and the per-connection buffers.
//!
//! [`ConnectionManager`] owns the connector and runs the slow half of
//! ensure-open (close, connect, allocate) on the control thread.
//! [`OpenConnection`] is the live half the audio thread uses: the link plus
//! the mix and input buffers sized for the channel counts it was opened
//! with. A connection is replaced by taking it out of the engine, closing
//! it here, and only then opening a new one; never two live links.

use crate::error::TransportError;
use crate::transport::{AudioTransport, TransportLink};

/// Owns the transport connector and opens/closes connections.
pub(crate) struct ConnectionManager {
    transport: Box<dyn AudioTransport>,
    block_size: usize,
    input_channels: usize,
}

impl ConnectionManager {
    pub(crate) fn new(
        transport: Box<dyn AudioTransport>,
        block_size: usize,
        input_channels: usize,
    ) -> Self {
        Self {
            transport,
            block_size,
            input_channels,
        }
    }

    /// Connects and allocates zeroed buffers for `total_channels` outputs.
    ///
    /// The slow half of ensure-open; must only run with no live connection
    /// (close-before-reopen). Failure leaves nothing half-open: no link, no
    /// buffers.
    pub(crate) fn open(&mut self, total_channels: usize) -> Result<OpenConnection, TransportError> {
        let link = self.transport.connect(self.input_channels, total_channels)?;
        tracing::info!(
            transport = self.transport.name(),
            inputs = self.input_channels,
            outputs = total_channels,
            "transport opened"
        );
        Ok(OpenConnection {
            link,
            mix: vec![0.0; self.block_size * total_channels],
            input: vec![0.0; self.block_size * self.input_channels],
            outputs: total_channels,
            input_channels: self.input_channels,
        })
    }

    /// Closes a connection previously taken out of the engine.
    pub(crate) fn close(&mut self, mut conn: OpenConnection) {
        conn.link.close();
        tracing::info!(transport = self.transport.name(), "transport closed");
    }
}

/// One live connection: the link and the buffers sized for it.
///
/// All methods are bounded and allocation-free; the audio thread calls them
/// under the engine lock.
pub(crate) struct OpenConnection {
    link: Box<dyn TransportLink>,
    /// Outgoing interleaved block, `block_size * outputs` samples.
    mix: Vec<f32>,
    /// Incoming interleaved block scratch, `block_size * input_channels`.
    input: Vec<f32>,
    outputs: usize,
    input_channels: usize,
}

impl OpenConnection {
    /// Output channel count this connection was opened with.
    pub(crate) fn outputs(&self) -> usize {
        self.outputs
    }

    /// The outgoing mix buffer.
    pub(crate) fn mix_mut(&mut self) -> &mut [f32] {
        &mut self.mix
    }

    /// Silences the mix buffer (layout changed, partial block discarded).
    pub(crate) fn zero_mix(&mut self) {
        self.mix.fill(0.0);
    }

    /// Writes the completed mix buffer to the transport.
    pub(crate) fn flush(&mut self) -> Result<(), TransportError> {
        self.link.write_block(&self.mix)
    }

    /// Reads the next input block and copies the producer's channels
    /// (`offset..offset + channels` of the server's capture side) into
    /// `out`. A failed read substitutes silence.
    pub(crate) fn read_into(&mut self, offset: usize, channels: usize, out: &mut [f32]) {
        if let Err(e) = self.link.read_block(&mut self.input) {
            tracing::warn!(error = %e, "input read failed, substituting silence");
            self.input.fill(0.0);
        }
        extract_channels(&self.input, self.input_channels, offset, channels, out);
    }
}

/// Copies channels `offset..offset + channels` of an interleaved input
/// block into a producer-local frame-major buffer. Channels at or beyond
/// `input_channels` read as silence.
pub(crate) fn extract_channels(
    input: &[f32],
    input_channels: usize,
    offset: usize,
    channels: usize,
    out: &mut [f32],
) {
    debug_assert!(channels > 0);
    debug_assert_eq!(out.len() % channels, 0);

    for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
        for (c, sample) in frame.iter_mut().enumerate() {
            let src = offset + c;
            *sample = if src < input_channels {
                input[i * input_channels + src]
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn manager_with(block_size: usize, input_channels: usize) -> (ConnectionManager, MockTransport) {
        let transport = MockTransport::with_block_size(block_size);
        let probe = transport.clone();
        (
            ConnectionManager::new(Box::new(transport), block_size, input_channels),
            probe,
        )
    }

    #[test]
    fn test_open_allocates_zeroed_buffers() {
        let (mut manager, probe) = manager_with(4, 2);
        let mut conn = manager.open(3).unwrap();

        assert_eq!(conn.outputs(), 3);
        assert_eq!(conn.mix_mut().len(), 12);
        assert!(conn.mix_mut().iter().all(|&s| s == 0.0));
        assert_eq!(probe.open_channels(), Some((2, 3)));
    }

    #[test]
    fn test_open_failure_leaves_closed_state() {
        let (mut manager, probe) = manager_with(4, 0);
        probe.fail_next_connects(1);

        assert!(manager.open(2).is_err());
        assert!(!probe.is_open());
        assert_eq!(probe.connect_count(), 0);
    }

    #[test]
    fn test_flush_writes_mix_buffer() {
        let (mut manager, probe) = manager_with(2, 0);
        let mut conn = manager.open(1).unwrap();

        conn.mix_mut().copy_from_slice(&[0.25, 0.75]);
        conn.flush().unwrap();

        assert_eq!(probe.written_blocks(), vec![vec![0.25, 0.75]]);
    }

    #[test]
    fn test_close_releases_link() {
        let (mut manager, probe) = manager_with(2, 0);
        let conn = manager.open(1).unwrap();
        assert!(probe.is_open());

        manager.close(conn);
        assert!(!probe.is_open());
        assert_eq!(probe.close_count(), 1);
    }

    #[test]
    fn test_read_into_extracts_own_channels() {
        let (mut manager, probe) = manager_with(2, 3);
        // Two frames of three input channels.
        probe.set_input_block(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let mut conn = manager.open(1).unwrap();

        let mut out = [0.0f32; 2];
        conn.read_into(1, 1, &mut out);
        assert_eq!(out, [0.2, 0.5]);
    }

    #[test]
    fn test_read_beyond_input_channels_is_silence() {
        let (mut manager, probe) = manager_with(1, 2);
        probe.set_input_block(vec![0.1, 0.2]);
        let mut conn = manager.open(4).unwrap();

        // Producer spans channels 1-2, but only channels 0-1 exist on the
        // input side.
        let mut out = [9.0f32; 2];
        conn.read_into(1, 2, &mut out);
        assert_eq!(out, [0.2, 0.0]);
    }

    #[test]
    fn test_read_failure_substitutes_silence() {
        let (mut manager, probe) = manager_with(2, 2);
        probe.set_input_block(vec![0.1, 0.2, 0.3, 0.4]);
        let mut conn = manager.open(1).unwrap();

        probe.fail_next_reads(1);
        let mut out = [9.0f32; 2];
        conn.read_into(0, 1, &mut out);
        assert_eq!(out, [0.0, 0.0], "a failed read yields silence");

        conn.read_into(0, 1, &mut out);
        assert_eq!(out, [0.1, 0.3]);
    }

    #[test]
    fn test_extract_channels_zero_input() {
        let mut out = [9.0f32; 4];
        extract_channels(&[], 0, 0, 2, &mut out);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_zero_mix() {
        let (mut manager, _probe) = manager_with(2, 0);
        let mut conn = manager.open(2).unwrap();
        conn.mix_mut().fill(0.5);
        conn.zero_mix();
        assert!(conn.mix_mut().iter().all(|&s| s == 0.0));
    }
}
