//! The external audio server seam, plus a mock implementation for tests.
//!
//! The bridge never talks to the server directly; it drives an
//! [`AudioTransport`] (the connector, slow operations allowed) which hands
//! out a [`TransportLink`] (the live connection, real-time safe). Splitting
//! the two makes "at most one live handle" structural: the connection
//! manager must drop the closed link before it can connect again.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DEFAULT_BLOCK_SIZE;
use crate::error::TransportError;

/// Connector for the external audio server.
///
/// Implementations wrap the native client library. `connect` may block and
/// allocate; the bridge only ever calls it from the control thread, never
/// from the host's audio callback.
///
/// # Example
///
/// ```
/// use bridge_audio::{AudioTransport, TransportError, TransportLink};
///
/// struct NullTransport;
/// struct NullLink;
///
/// impl AudioTransport for NullTransport {
///     fn name(&self) -> &str {
///         "null"
///     }
///
///     fn block_size(&self) -> usize {
///         1024
///     }
///
///     fn connect(
///         &mut self,
///         _input_channels: usize,
///         _output_channels: usize,
///     ) -> Result<Box<dyn TransportLink>, TransportError> {
///         Ok(Box::new(NullLink))
///     }
/// }
///
/// impl TransportLink for NullLink {
///     fn write_block(&mut self, _interleaved: &[f32]) -> Result<(), TransportError> {
///         Ok(())
///     }
///
///     fn read_block(&mut self, interleaved: &mut [f32]) -> Result<(), TransportError> {
///         interleaved.fill(0.0);
///         Ok(())
///     }
///
///     fn close(&mut self) {}
/// }
/// ```
pub trait AudioTransport: Send {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// The server's fixed block size in frames.
    ///
    /// Checked against [`BridgeConfig::block_size`](crate::BridgeConfig) at
    /// build time; a mismatch is a fatal configuration error.
    fn block_size(&self) -> usize;

    /// Opens a connection exposing the given channel counts.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the connection cannot be established
    /// (name collision, server not running, resource exhaustion). The bridge
    /// treats this as transient and retries on the next layout change or
    /// explicit reconnect.
    fn connect(
        &mut self,
        input_channels: usize,
        output_channels: usize,
    ) -> Result<Box<dyn TransportLink>, TransportError>;
}

/// One live connection to the external server.
///
/// `write_block` and `read_block` run on the host's real-time audio thread:
/// implementations must not block, allocate, or panic there (native clients
/// exchange blocks through their own ring buffers). `close` is called
/// exactly once, from the control thread, before the link is dropped.
pub trait TransportLink: Send {
    /// Writes one interleaved block of `block_size * output_channels`
    /// samples.
    ///
    /// # Errors
    ///
    /// A failed write loses that block only; the bridge logs it and keeps
    /// the link.
    fn write_block(&mut self, interleaved: &[f32]) -> Result<(), TransportError>;

    /// Fills `interleaved` with the next block of
    /// `block_size * input_channels` samples from the server.
    ///
    /// # Errors
    ///
    /// On failure the caller substitutes silence.
    fn read_block(&mut self, interleaved: &mut [f32]) -> Result<(), TransportError>;

    /// Releases the server-side ports.
    fn close(&mut self);
}

/// A transport that talks to no server, for testing without one.
///
/// Records every written block, serves a scripted input block, and can be
/// told to fail upcoming connects, writes, or reads. Cloning yields a
/// handle to the same underlying state, so tests keep a clone and hand the
/// original to the bridge.
///
/// # Example
///
/// ```
/// use bridge_audio::MockTransport;
///
/// let transport = MockTransport::new();
/// let probe = transport.clone();
///
/// // ... hand `transport` to the bridge, drive some blocks ...
///
/// assert_eq!(probe.written_count(), 0);
/// ```
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

struct MockState {
    block_size: usize,
    connect_failures: AtomicUsize,
    write_failures: AtomicUsize,
    read_failures: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    open: AtomicBool,
    open_channels: Mutex<Option<(usize, usize)>>,
    written: Mutex<Vec<Vec<f32>>>,
    input_block: Mutex<Vec<f32>>,
}

impl MockTransport {
    /// Creates a mock with the default block size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Creates a mock reporting the given block size.
    #[must_use]
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            state: Arc::new(MockState {
                block_size,
                connect_failures: AtomicUsize::new(0),
                write_failures: AtomicUsize::new(0),
                read_failures: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                open: AtomicBool::new(false),
                open_channels: Mutex::new(None),
                written: Mutex::new(Vec::new()),
                input_block: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Makes the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` block writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.state.write_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` block reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.state.read_failures.store(n, Ordering::SeqCst);
    }

    /// Sets the samples served by `read_block` (zero-padded or truncated to
    /// the reader's length).
    pub fn set_input_block(&self, samples: Vec<f32>) {
        *self.state.input_block.lock() = samples;
    }

    /// Number of successful connects so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of link closes so far.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// True while a link is open and not yet closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    /// The `(input, output)` channel counts of the most recent connect.
    #[must_use]
    pub fn open_channels(&self) -> Option<(usize, usize)> {
        *self.state.open_channels.lock()
    }

    /// All blocks written so far, oldest first.
    #[must_use]
    pub fn written_blocks(&self) -> Vec<Vec<f32>> {
        self.state.written.lock().clone()
    }

    /// Number of blocks written so far.
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.state.written.lock().len()
    }

    /// The most recently written block, if any.
    #[must_use]
    pub fn last_written(&self) -> Option<Vec<f32>> {
        self.state.written.lock().last().cloned()
    }

    /// Forgets all recorded writes.
    pub fn clear_written(&self) {
        self.state.written.lock().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn block_size(&self) -> usize {
        self.state.block_size
    }

    fn connect(
        &mut self,
        input_channels: usize,
        output_channels: usize,
    ) -> Result<Box<dyn TransportLink>, TransportError> {
        let remaining = self.state.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::open_failed("scripted connect failure"));
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.open.store(true, Ordering::SeqCst);
        *self.state.open_channels.lock() = Some((input_channels, output_channels));

        Ok(Box::new(MockLink {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockLink {
    state: Arc<MockState>,
}

impl TransportLink for MockLink {
    fn write_block(&mut self, interleaved: &[f32]) -> Result<(), TransportError> {
        let remaining = self.state.write_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .write_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::write_failed("scripted write failure"));
        }
        self.state.written.lock().push(interleaved.to_vec());
        Ok(())
    }

    fn read_block(&mut self, interleaved: &mut [f32]) -> Result<(), TransportError> {
        let remaining = self.state.read_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .read_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::read_failed("scripted read failure"));
        }
        interleaved.fill(0.0);
        let input = self.state.input_block.lock();
        let len = input.len().min(interleaved.len());
        interleaved[..len].copy_from_slice(&input[..len]);
        Ok(())
    }

    fn close(&mut self) {
        self.state.open.store(false, Ordering::SeqCst);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}
