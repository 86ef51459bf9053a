//! The bridge context: control-plane operations and the real-time
//! submit/pull paths.
//!
//! [`AudioBridge`] is the one shared object of the crate. Hosts create it
//! once per process via [`AudioBridge::builder()`], register a producer per
//! plugin instance, and drive [`submit`](AudioBridge::submit) and
//! [`pull_input`](AudioBridge::pull_input) from their audio callbacks.
//!
//! Internally the bridge keeps two locks with a strict order (control
//! before engine, never the reverse):
//!
//! * the **control** lock serializes registration, renegotiation, and all
//!   slow transport work;
//! * the **engine** lock guards the published layout and the per-block
//!   buffers the audio threads touch. Everything under it is bounded:
//!   copies, flag flips, one transport write. New layouts are built outside
//!   and swapped in; replaced state is dropped after unlock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::BridgeConfig;
use crate::engine::{
    interleave_into, BlockAggregator, ConnectionManager, OpenConnection, SpoolBuffer, SubmitMark,
};
use crate::error::{BridgeError, TransportError};
use crate::event::{event_callback, BridgeEvent, EventCallback};
use crate::producer::ProducerId;
use crate::registry::{ChannelLayout, ChannelRegistry};
use crate::transport::AudioTransport;

/// Every Nth flushed block emits a debug log entry, roughly one line per
/// five seconds at 48 kHz with 1024-frame blocks.
const FLUSH_LOG_INTERVAL: u64 = 256;

/// Counters describing what the bridge has done so far.
///
/// Returned by [`AudioBridge::stats`]; all counts are cumulative since the
/// bridge was built.
#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    /// Complete blocks written to the transport.
    pub blocks_flushed: u64,
    /// Blocks discarded because they completed while the transport was
    /// closed.
    pub blocks_dropped: u64,
    /// Submissions that overwrote an earlier one for the same block.
    pub duplicate_submissions: u64,
    /// Submissions diverted to the spool while the transport was closed.
    pub spooled_submissions: u64,
    /// Transport connections opened, including reopens after a layout
    /// change.
    pub renegotiations: u64,
    /// Transport open attempts that failed.
    pub open_failures: u64,
    /// Block writes the transport rejected.
    pub write_failures: u64,
}

/// Atomic backing for [`BridgeStats`]; written from both lock domains.
struct StatCounters {
    blocks_flushed: AtomicU64,
    blocks_dropped: AtomicU64,
    duplicate_submissions: AtomicU64,
    spooled_submissions: AtomicU64,
    renegotiations: AtomicU64,
    open_failures: AtomicU64,
    write_failures: AtomicU64,
}

impl StatCounters {
    fn new() -> Self {
        Self {
            blocks_flushed: AtomicU64::new(0),
            blocks_dropped: AtomicU64::new(0),
            duplicate_submissions: AtomicU64::new(0),
            spooled_submissions: AtomicU64::new(0),
            renegotiations: AtomicU64::new(0),
            open_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            blocks_flushed: self.blocks_flushed.load(Ordering::SeqCst),
            blocks_dropped: self.blocks_dropped.load(Ordering::SeqCst),
            duplicate_submissions: self.duplicate_submissions.load(Ordering::SeqCst),
            spooled_submissions: self.spooled_submissions.load(Ordering::SeqCst),
            renegotiations: self.renegotiations.load(Ordering::SeqCst),
            open_failures: self.open_failures.load(Ordering::SeqCst),
            write_failures: self.write_failures.load(Ordering::SeqCst),
        }
    }
}

/// Control-plane state: the registry of record and the transport manager.
struct ControlState {
    registry: ChannelRegistry,
    manager: ConnectionManager,
}

/// Audio-plane state published to the real-time paths.
struct EngineCore {
    layout: Arc<ChannelLayout>,
    block: BlockAggregator,
    spool: SpoolBuffer,
    conn: Option<OpenConnection>,
}

/// Channel-aggregation bridge between per-instance producers and one
/// external audio server connection.
///
/// Producers register with a channel count and receive a [`ProducerId`];
/// each audio cycle every producer submits its interleaved sub-buffer, and
/// once all have reported the merged block is written to the transport as
/// one wide interleaved buffer. Registration changes recompute the channel
/// layout and renegotiate the server connection; submissions made while no
/// connection exists are spooled and replayed when one comes up.
///
/// All methods take `&self`; the bridge is meant to be shared behind an
/// [`Arc`] between the host's control thread and its audio callbacks.
///
/// # Example
///
/// ```
/// use bridge_audio::{AudioBridge, MockTransport};
///
/// let bridge = AudioBridge::builder()
///     .transport(MockTransport::new())
///     .start()?;
///
/// let id = bridge.register_producer(2);
/// assert_eq!(bridge.total_channels(), 2);
///
/// bridge.close();
/// # Ok::<(), bridge_audio::BridgeError>(())
/// ```
pub struct AudioBridge {
    control: Mutex<ControlState>,
    engine: Mutex<EngineCore>,
    stats: StatCounters,
    event_callback: Option<EventCallback>,
    block_size: usize,
    input_channels: usize,
}

impl AudioBridge {
    /// Creates a builder for configuring a bridge.
    #[must_use]
    pub fn builder() -> AudioBridgeBuilder {
        AudioBridgeBuilder::new()
    }

    /// Registers a producer and returns its id.
    ///
    /// `channels` may be 0 if the count is not yet known; report it later
    /// with [`update_producer_channels`](Self::update_producer_channels).
    /// The layout recomputes immediately and the transport reopens if the
    /// total channel count changed. An open failure is not an error here:
    /// the bridge stays closed, reports the failure through the event
    /// callback, and retries on the next layout change or
    /// [`reconnect`](Self::reconnect).
    pub fn register_producer(&self, channels: usize) -> ProducerId {
        let mut control = self.control.lock();
        let (id, layout) = control.registry.register(channels);
        let pending = self.publish_layout(&mut control, layout);
        drop(control);
        self.emit_all(pending);
        id
    }

    /// Replaces a producer's channel count.
    ///
    /// Setting the count it already has is a no-op: the layout keeps its
    /// generation and in-flight aggregation survives.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownProducer`] if `id` is not registered.
    pub fn update_producer_channels(
        &self,
        id: ProducerId,
        channels: usize,
    ) -> Result<(), BridgeError> {
        let mut control = self.control.lock();
        let layout = control.registry.update(id, channels)?;
        let pending = self.publish_layout(&mut control, layout);
        drop(control);
        self.emit_all(pending);
        Ok(())
    }

    /// Removes a producer.
    ///
    /// Later producers shift down to fill the gap; if the total channel
    /// count changed the transport reopens with the narrower layout. An
    /// empty layout closes the transport instead.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownProducer`] if `id` is not registered.
    pub fn unregister_producer(&self, id: ProducerId) -> Result<(), BridgeError> {
        let mut control = self.control.lock();
        let layout = control.registry.unregister(id)?;
        let pending = self.publish_layout(&mut control, layout);
        drop(control);
        self.emit_all(pending);
        Ok(())
    }

    /// Unregisters every producer and discards in-flight aggregation.
    ///
    /// The now-empty layout closes the transport. The bridge stays usable:
    /// registering again brings it back up.
    pub fn reset(&self) {
        let mut control = self.control.lock();
        let layout = control.registry.reset();
        let pending = self.publish_layout(&mut control, layout);
        drop(control);
        self.emit_all(pending);
    }

    /// Releases the server connection, keeping every registration.
    ///
    /// Submissions spool (and blocks completing while closed are dropped)
    /// until [`reconnect`](Self::reconnect) or the next layout change
    /// brings the connection back up. Use [`reset`](Self::reset) to also
    /// unregister all producers. Idempotent, and runs on drop as a last
    /// resort.
    pub fn close(&self) {
        let mut control = self.control.lock();
        let taken = {
            let mut engine = self.engine.lock();
            let conn = engine.conn.take();
            if conn.is_some() {
                // Contributions for the in-flight block lived in the
                // released mix buffer.
                engine.block.clear();
            }
            conn
        };
        let Some(conn) = taken else {
            return;
        };
        control.manager.close(conn);
        drop(control);
        self.emit(BridgeEvent::TransportClosed);
    }

    /// Retries the transport connection for the current layout.
    ///
    /// A no-op when already connected or when no producers are registered.
    /// On success, sub-buffers spooled while closed are replayed into the
    /// fresh mix buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TransportOpen`] if the connect attempt
    /// failed; the bridge stays closed and can be retried again.
    pub fn reconnect(&self) -> Result<(), BridgeError> {
        let mut control = self.control.lock();
        let layout = control.registry.snapshot();

        if layout.is_empty() {
            // Nothing to connect for; an empty layout keeps the
            // transport closed.
            return Ok(());
        }
        if self.engine.lock().conn.is_some() {
            return Ok(());
        }

        match self.open_and_install(&mut control, &layout) {
            Ok(pending) => {
                drop(control);
                self.emit_all(pending);
                Ok(())
            }
            Err(e) => {
                drop(control);
                self.emit(BridgeEvent::TransportOpenFailed {
                    reason: e.to_string(),
                });
                Err(BridgeError::from(e))
            }
        }
    }

    /// Submits one producer's interleaved sub-buffer for the current block.
    ///
    /// Real-time safe: bounded work under the engine lock, no allocation.
    /// The samples are interleaved into the mix buffer at the producer's
    /// channel offset; when every contributing producer has reported, the
    /// completed block is written to the transport before the call returns.
    /// While the transport is closed the sub-buffer is spooled instead, and
    /// a block completing in that state is dropped.
    ///
    /// Submitting twice in one block overwrites the earlier samples.
    /// Unknown ids, producers with no channel count yet, and slices of the
    /// wrong length are ignored.
    pub fn submit(&self, id: ProducerId, samples: &[f32]) {
        let mut engine = self.engine.lock();
        let core = &mut *engine;

        let Some(slot_index) = core.layout.slot_index(id) else {
            drop(engine);
            tracing::warn!(%id, "submit from unknown producer ignored");
            return;
        };
        let slot = core.layout.slots()[slot_index];
        if slot.channels == 0 {
            // Channel count not reported yet; nothing to aggregate.
            return;
        }
        let expected_len = self.block_size * slot.channels;
        if samples.len() != expected_len {
            drop(engine);
            tracing::warn!(
                %id,
                got = samples.len(),
                expected = expected_len,
                "submit with wrong sample count ignored"
            );
            return;
        }

        let expected = core.layout.contributing_producers();
        let mark;
        let mut flushed = None;
        let mut spooled = false;
        let mut dropped = None;

        match core.conn.as_mut() {
            Some(conn) => {
                mark = core.block.mark(slot_index);
                interleave_into(
                    conn.mix_mut(),
                    core.layout.total_channels(),
                    slot.offset,
                    slot.channels,
                    samples,
                );
                if core.block.is_complete(expected) {
                    flushed = Some(conn.flush());
                    core.block.clear();
                }
            }
            None => {
                mark = core.spool.store(slot_index, samples);
                spooled = true;
                if core.spool.occupied() >= expected {
                    // Complete while closed: the flush is a silent drop.
                    dropped = Some(core.spool.occupied());
                    core.spool.clear();
                }
            }
        }
        drop(engine);

        if mark == SubmitMark::Duplicate {
            self.stats.duplicate_submissions.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(%id, "duplicate submission, keeping latest");
            self.emit(BridgeEvent::DuplicateSubmission { id });
        }
        if spooled {
            self.stats.spooled_submissions.fetch_add(1, Ordering::SeqCst);
        }
        match flushed {
            Some(Ok(())) => {
                let flushed_total = self.stats.blocks_flushed.fetch_add(1, Ordering::SeqCst) + 1;
                if flushed_total % FLUSH_LOG_INTERVAL == 0 {
                    tracing::debug!(blocks = flushed_total, "block flushed");
                }
            }
            Some(Err(e)) => {
                self.stats.write_failures.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(error = %e, "block write failed, block lost");
                self.emit(BridgeEvent::WriteFailed);
            }
            None => {}
        }
        if let Some(producers) = dropped {
            self.stats.blocks_dropped.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(producers, "block completed while closed, dropped");
            self.emit(BridgeEvent::BlockDropped { producers });
        }
    }

    /// Fills `out` with the producer's channels of the server's return
    /// path.
    ///
    /// Real-time safe. The producer reads the same channel offset it
    /// writes to; channels beyond the connection's input width, unknown
    /// ids, wrongly sized buffers, and a closed transport all produce
    /// silence.
    pub fn pull_input(&self, id: ProducerId, out: &mut [f32]) {
        let mut engine = self.engine.lock();
        let core = &mut *engine;

        let Some(slot) = core.layout.slot(id).copied() else {
            drop(engine);
            out.fill(0.0);
            tracing::debug!(%id, "input pull from unknown producer, returning silence");
            return;
        };
        if slot.channels == 0 {
            drop(engine);
            out.fill(0.0);
            return;
        }
        let expected_len = self.block_size * slot.channels;
        if out.len() != expected_len {
            drop(engine);
            out.fill(0.0);
            tracing::warn!(
                %id,
                got = out.len(),
                expected = expected_len,
                "input pull with wrong buffer size, returning silence"
            );
            return;
        }

        match core.conn.as_mut() {
            Some(conn) => conn.read_into(slot.offset, slot.channels, out),
            None => out.fill(0.0),
        }
    }

    /// Total channel count of the current layout.
    #[must_use]
    pub fn total_channels(&self) -> usize {
        self.engine.lock().layout.total_channels()
    }

    /// Number of registered producers.
    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.engine.lock().layout.producer_count()
    }

    /// The producer's channel offset in the merged block, if registered.
    #[must_use]
    pub fn offset_of(&self, id: ProducerId) -> Option<usize> {
        self.engine.lock().layout.offset_of(id)
    }

    /// The producer's channel count, if registered.
    #[must_use]
    pub fn channels_of(&self, id: ProducerId) -> Option<usize> {
        self.engine.lock().layout.channels_of(id)
    }

    /// The current layout snapshot.
    #[must_use]
    pub fn layout(&self) -> Arc<ChannelLayout> {
        Arc::clone(&self.engine.lock().layout)
    }

    /// True while a transport connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.engine.lock().conn.is_some()
    }

    /// The fixed block size in frames.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Channel count of the server's return path.
    #[must_use]
    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    /// Returns current bridge statistics.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        self.stats.snapshot()
    }

    /// Publishes a new layout to the engine and renegotiates the transport
    /// if the total channel count changed. Returns events to emit once the
    /// control lock is released.
    fn publish_layout(
        &self,
        control: &mut ControlState,
        layout: Arc<ChannelLayout>,
    ) -> Vec<BridgeEvent> {
        let mut pending = Vec::new();
        let total = layout.total_channels();

        // Fresh per-block state, built before touching the engine lock.
        let mut block = BlockAggregator::for_layout(&layout);
        let mut spool = SpoolBuffer::for_layout(&layout, self.block_size);

        let (taken, keep_link, discarded) = {
            let mut engine = self.engine.lock();
            if engine.layout.generation() == layout.generation() {
                // Same mapping; the in-flight block survives.
                return pending;
            }

            let keep_link = total > 0
                && engine
                    .conn
                    .as_ref()
                    .is_some_and(|conn| conn.outputs() == total);
            let discarded = engine.block.reported_count() + engine.spool.occupied();

            engine.layout = Arc::clone(&layout);
            std::mem::swap(&mut engine.block, &mut block);
            std::mem::swap(&mut engine.spool, &mut spool);

            if keep_link {
                // Totals match but offsets may have moved; the partial
                // mix is stale either way.
                if let Some(conn) = engine.conn.as_mut() {
                    conn.zero_mix();
                }
                (None, true, discarded)
            } else {
                (engine.conn.take(), false, discarded)
            }
        };
        // Replaced aggregation state drops here, off the audio path.
        drop(block);
        drop(spool);

        if discarded > 0 {
            // A submit raced the layout change; its block restarts under
            // the new mapping.
            tracing::debug!(reported = discarded, "discarded partial block at layout change");
        }

        pending.push(BridgeEvent::LayoutChanged {
            producers: layout.producer_count(),
            total_channels: total,
        });

        if let Some(conn) = taken {
            control.manager.close(conn);
            pending.push(BridgeEvent::TransportClosed);
        }

        if !keep_link && total > 0 {
            match self.open_and_install(control, &layout) {
                Ok(events) => pending.extend(events),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "transport open failed, will retry on next layout change"
                    );
                    pending.push(BridgeEvent::TransportOpenFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }

        pending
    }

    /// Opens a connection for `layout` and installs it, replaying any
    /// spooled sub-buffers into the fresh mix buffer.
    ///
    /// Must run with the control lock held and no live connection.
    fn open_and_install(
        &self,
        control: &mut ControlState,
        layout: &Arc<ChannelLayout>,
    ) -> Result<Vec<BridgeEvent>, TransportError> {
        let total = layout.total_channels();
        let mut conn = match control.manager.open(total) {
            Ok(conn) => conn,
            Err(e) => {
                self.stats.open_failures.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.stats.renegotiations.fetch_add(1, Ordering::SeqCst);

        let mut pending = vec![BridgeEvent::TransportOpened {
            inputs: self.input_channels,
            outputs: total,
        }];

        let replayed = {
            let mut engine = self.engine.lock();
            let core = &mut *engine;
            let replayed = core.spool.replay_into(layout, conn.mix_mut(), &mut core.block);
            core.conn = Some(conn);
            replayed
        };
        if replayed > 0 {
            tracing::debug!(producers = replayed, "replayed spooled sub-buffers");
            pending.push(BridgeEvent::SpoolReplayed {
                producers: replayed,
            });
        }

        Ok(pending)
    }

    fn emit(&self, event: BridgeEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    fn emit_all(&self, events: Vec<BridgeEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builder for configuring and starting an [`AudioBridge`].
///
/// # Example
///
/// ```
/// use bridge_audio::{AudioBridge, BridgeConfig, MockTransport};
///
/// let bridge = AudioBridge::builder()
///     .transport(MockTransport::new())
///     .config(BridgeConfig::default())
///     .on_event(|event| println!("{event:?}"))
///     .start()?;
/// # drop(bridge);
/// # Ok::<(), bridge_audio::BridgeError>(())
/// ```
#[must_use]
pub struct AudioBridgeBuilder {
    transport: Option<Box<dyn AudioTransport>>,
    config: BridgeConfig,
    event_callback: Option<EventCallback>,
}

impl Default for AudioBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBridgeBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            transport: None,
            config: BridgeConfig::default(),
            event_callback: None,
        }
    }

    /// Sets the transport connecting the bridge to the audio server.
    pub fn transport(mut self, transport: impl AudioTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Sets the bridge configuration.
    ///
    /// Default: [`BridgeConfig::default()`].
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a callback to receive runtime events.
    ///
    /// Events cover transport lifecycle, layout changes, and aggregation
    /// anomalies. Some are emitted from the host's audio threads, so the
    /// callback must not block.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Builds the bridge.
    ///
    /// No connection is made yet; the transport opens when the first
    /// producer registers.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - no transport is configured
    /// - the configured block size is zero
    /// - the transport runs at a different block size than configured
    pub fn start(self) -> Result<AudioBridge, BridgeError> {
        let transport = self.transport.ok_or(BridgeError::NoTransportConfigured)?;
        if self.config.block_size == 0 {
            return Err(BridgeError::ZeroBlockSize);
        }
        let transport_block = transport.block_size();
        if transport_block != self.config.block_size {
            return Err(BridgeError::BlockSizeMismatch {
                configured: self.config.block_size,
                transport: transport_block,
            });
        }

        tracing::info!(
            transport = transport.name(),
            block_size = self.config.block_size,
            input_channels = self.config.input_channels,
            "audio bridge started"
        );

        let block_size = self.config.block_size;
        let input_channels = self.config.input_channels;
        let layout = ChannelLayout::empty();

        Ok(AudioBridge {
            control: Mutex::new(ControlState {
                registry: ChannelRegistry::new(),
                manager: ConnectionManager::new(transport, block_size, input_channels),
            }),
            engine: Mutex::new(EngineCore {
                block: BlockAggregator::for_layout(&layout),
                spool: SpoolBuffer::for_layout(&layout, block_size),
                layout,
                conn: None,
            }),
            stats: StatCounters::new(),
            event_callback: self.event_callback,
            block_size,
            input_channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn bridge_with(block_size: usize, input_channels: usize) -> (AudioBridge, MockTransport) {
        let transport = MockTransport::with_block_size(block_size);
        let probe = transport.clone();
        let bridge = AudioBridge::builder()
            .transport(transport)
            .config(BridgeConfig {
                block_size,
                input_channels,
            })
            .start()
            .unwrap();
        (bridge, probe)
    }

    #[test]
    fn test_builder_requires_transport() {
        let result = AudioBridge::builder().start();
        assert!(matches!(result, Err(BridgeError::NoTransportConfigured)));
    }

    #[test]
    fn test_builder_rejects_zero_block_size() {
        let result = AudioBridge::builder()
            .transport(MockTransport::new())
            .config(BridgeConfig {
                block_size: 0,
                input_channels: 2,
            })
            .start();
        assert!(matches!(result, Err(BridgeError::ZeroBlockSize)));
    }

    #[test]
    fn test_builder_rejects_block_size_mismatch() {
        let result = AudioBridge::builder()
            .transport(MockTransport::with_block_size(512))
            .config(BridgeConfig {
                block_size: 1024,
                input_channels: 2,
            })
            .start();
        assert!(matches!(
            result,
            Err(BridgeError::BlockSizeMismatch {
                configured: 1024,
                transport: 512,
            })
        ));
    }

    #[test]
    fn test_register_opens_transport() {
        let (bridge, probe) = bridge_with(4, 2);
        assert!(!bridge.is_connected());

        let id = bridge.register_producer(2);
        assert!(bridge.is_connected());
        assert_eq!(probe.open_channels(), Some((2, 2)));
        assert_eq!(bridge.offset_of(id), Some(0));
    }

    #[test]
    fn test_register_survives_open_failure() {
        let (bridge, probe) = bridge_with(4, 0);
        probe.fail_next_connects(1);

        let id = bridge.register_producer(2);
        assert!(!bridge.is_connected());
        assert_eq!(bridge.total_channels(), 2);
        assert_eq!(bridge.offset_of(id), Some(0));
        assert_eq!(bridge.stats().open_failures, 1);
    }

    #[test]
    fn test_submit_flushes_when_all_report() {
        let (bridge, probe) = bridge_with(2, 0);
        let a = bridge.register_producer(1);
        let b = bridge.register_producer(1);

        bridge.submit(a, &[0.1, 0.2]);
        assert_eq!(probe.written_count(), 0);

        bridge.submit(b, &[0.3, 0.4]);
        assert_eq!(probe.written_blocks(), vec![vec![0.1, 0.3, 0.2, 0.4]]);
        assert_eq!(bridge.stats().blocks_flushed, 1);
    }

    #[test]
    fn test_duplicate_submission_keeps_latest() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(1);
        let b = bridge.register_producer(1);

        bridge.submit(a, &[0.1]);
        bridge.submit(a, &[0.9]);
        bridge.submit(b, &[0.5]);

        assert_eq!(probe.last_written(), Some(vec![0.9, 0.5]));
        assert_eq!(bridge.stats().duplicate_submissions, 1);
    }

    #[test]
    fn test_zero_channel_producer_does_not_block_flush() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(2);
        let pending = bridge.register_producer(0);

        // Total floors at the producer count but stays at the channel sum
        // here; the unsized producer is not expected to report.
        assert_eq!(bridge.total_channels(), 2);
        bridge.submit(a, &[0.1, 0.2]);
        assert_eq!(probe.written_count(), 1);
        assert_eq!(bridge.channels_of(pending), Some(0));
    }

    #[test]
    fn test_unregister_renegotiates() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(1);
        let b = bridge.register_producer(2);
        assert_eq!(probe.connect_count(), 2);
        assert_eq!(bridge.offset_of(b), Some(1));

        bridge.unregister_producer(a).unwrap();
        assert_eq!(probe.connect_count(), 3);
        assert_eq!(probe.close_count(), 2);
        assert_eq!(bridge.offset_of(b), Some(0));
        assert_eq!(bridge.total_channels(), 2);
    }

    #[test]
    fn test_same_total_keeps_link() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(1);
        let b = bridge.register_producer(1);
        assert_eq!(probe.connect_count(), 2);

        // {0, 1} still totals 2 via the producer-count floor; the link
        // survives but offsets shift.
        bridge.update_producer_channels(a, 0).unwrap();
        assert_eq!(probe.connect_count(), 2);
        assert_eq!(bridge.total_channels(), 2);
        assert_eq!(bridge.offset_of(b), Some(0));
        assert!(bridge.is_connected());
    }

    #[test]
    fn test_keep_link_rezeroes_mix() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(1);
        let b = bridge.register_producer(1);
        let c = bridge.register_producer(1);

        // A partial block leaves a stale sample at c's old offset 2.
        bridge.submit(c, &[0.7]);

        // {0, 1, 1} floors at three producers: same total, link kept,
        // but channel 2 is now unassigned padding.
        bridge.update_producer_channels(a, 0).unwrap();
        assert_eq!(bridge.total_channels(), 3);
        assert_eq!(bridge.offset_of(c), Some(1));

        bridge.submit(b, &[0.2]);
        bridge.submit(c, &[0.4]);
        assert_eq!(
            probe.written_blocks(),
            vec![vec![0.2, 0.4, 0.0]],
            "the kept link's mix buffer starts over zeroed"
        );
    }

    #[test]
    fn test_update_same_count_is_noop() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(2);
        assert_eq!(probe.connect_count(), 1);

        bridge.update_producer_channels(a, 2).unwrap();
        assert_eq!(probe.connect_count(), 1);
        assert_eq!(probe.close_count(), 0);
    }

    #[test]
    fn test_update_unknown_producer() {
        let (bridge, _probe) = bridge_with(1, 0);
        let result = bridge.update_producer_channels(ProducerId::new(7), 2);
        assert!(matches!(result, Err(BridgeError::UnknownProducer { .. })));
    }

    #[test]
    fn test_closed_bridge_drops_completed_blocks() {
        let (bridge, probe) = bridge_with(1, 0);
        probe.fail_next_connects(1);
        let a = bridge.register_producer(1);
        assert!(!bridge.is_connected());

        bridge.submit(a, &[0.5]);
        assert_eq!(probe.written_count(), 0);
        let stats = bridge.stats();
        assert_eq!(stats.blocks_dropped, 1);
        assert_eq!(stats.spooled_submissions, 1);
    }

    #[test]
    fn test_reconnect_after_failure() {
        let (bridge, probe) = bridge_with(1, 0);
        probe.fail_next_connects(1);
        let a = bridge.register_producer(1);
        assert!(!bridge.is_connected());

        bridge.reconnect().unwrap();
        assert!(bridge.is_connected());

        bridge.submit(a, &[0.5]);
        assert_eq!(probe.written_blocks(), vec![vec![0.5]]);
    }

    #[test]
    fn test_reconnect_replays_spool() {
        let (bridge, probe) = bridge_with(1, 0);
        // Both registrations fail to open; the second one retries.
        probe.fail_next_connects(2);
        let a = bridge.register_producer(1);
        let b = bridge.register_producer(1);
        assert!(!bridge.is_connected());

        // Only one of two producers reports while closed, so the partial
        // block spools rather than dropping.
        bridge.submit(a, &[0.7]);
        bridge.reconnect().unwrap();
        assert_eq!(probe.written_count(), 0);

        bridge.submit(b, &[0.3]);
        assert_eq!(probe.written_blocks(), vec![vec![0.7, 0.3]]);
    }

    #[test]
    fn test_reconnect_is_noop_when_connected() {
        let (bridge, probe) = bridge_with(1, 0);
        bridge.register_producer(1);
        assert_eq!(probe.connect_count(), 1);

        bridge.reconnect().unwrap();
        assert_eq!(probe.connect_count(), 1);
    }

    #[test]
    fn test_reconnect_with_no_producers() {
        let (bridge, probe) = bridge_with(1, 0);
        bridge.reconnect().unwrap();
        assert_eq!(probe.connect_count(), 0);
    }

    #[test]
    fn test_reconnect_failure_returns_error() {
        let (bridge, probe) = bridge_with(1, 0);
        probe.fail_next_connects(2);
        bridge.register_producer(1);

        let result = bridge.reconnect();
        assert!(matches!(result, Err(BridgeError::TransportOpen { .. })));
        assert_eq!(bridge.stats().open_failures, 2);
    }

    #[test]
    fn test_write_failure_loses_block_only() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(1);

        probe.fail_next_writes(1);
        bridge.submit(a, &[0.1]);
        assert_eq!(bridge.stats().write_failures, 1);
        assert!(bridge.is_connected());

        bridge.submit(a, &[0.2]);
        assert_eq!(probe.written_blocks(), vec![vec![0.2]]);
    }

    #[test]
    fn test_submit_wrong_length_ignored() {
        let (bridge, probe) = bridge_with(2, 0);
        let a = bridge.register_producer(1);

        bridge.submit(a, &[0.1, 0.2, 0.3]);
        assert_eq!(probe.written_count(), 0);
        assert_eq!(bridge.stats().blocks_flushed, 0);
    }

    #[test]
    fn test_submit_unknown_id_ignored() {
        let (bridge, probe) = bridge_with(1, 0);
        bridge.register_producer(1);
        bridge.submit(ProducerId::new(42), &[0.1]);
        assert_eq!(probe.written_count(), 0);
    }

    #[test]
    fn test_pull_input_extracts_own_offset() {
        let (bridge, probe) = bridge_with(2, 3);
        assert_eq!(bridge.input_channels(), 3);
        let _a = bridge.register_producer(1);
        let b = bridge.register_producer(2);
        probe.set_input_block(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);

        let mut out = [0.0f32; 4];
        bridge.pull_input(b, &mut out);
        assert_eq!(out, [0.2, 0.3, 0.5, 0.6]);
    }

    #[test]
    fn test_pull_input_closed_is_silence() {
        let (bridge, probe) = bridge_with(2, 2);
        probe.fail_next_connects(1);
        let a = bridge.register_producer(1);

        let mut out = [9.0f32; 2];
        bridge.pull_input(a, &mut out);
        assert_eq!(out, [0.0, 0.0]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (bridge, probe) = bridge_with(1, 0);
        bridge.register_producer(1);
        assert!(probe.is_open());

        bridge.close();
        bridge.close();
        assert!(!probe.is_open());
        assert_eq!(probe.close_count(), 1);
        // Registrations survive a close; only the connection is released.
        assert_eq!(bridge.producer_count(), 1);
    }

    #[test]
    fn test_close_then_reconnect_resumes() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(1);
        bridge.close();
        assert!(!bridge.is_connected());

        bridge.reconnect().unwrap();
        assert!(bridge.is_connected());
        bridge.submit(a, &[0.4]);
        assert_eq!(probe.last_written(), Some(vec![0.4]));
    }

    #[test]
    fn test_reset_clears_registrations() {
        let (bridge, probe) = bridge_with(1, 0);
        let a = bridge.register_producer(1);
        bridge.register_producer(2);

        bridge.reset();
        assert_eq!(bridge.producer_count(), 0);
        assert!(!probe.is_open());

        // Idempotent: a second reset changes nothing.
        bridge.reset();
        assert_eq!(probe.close_count(), 2);

        // A submission from an unregistered producer is ignored.
        bridge.submit(a, &[0.9]);
        assert_eq!(probe.written_count(), 0);
    }

    #[test]
    fn test_drop_closes_transport() {
        let (bridge, probe) = bridge_with(1, 0);
        bridge.register_producer(1);
        assert!(probe.is_open());

        drop(bridge);
        assert!(!probe.is_open());
        assert_eq!(probe.close_count(), 1);
    }

    #[test]
    fn test_register_after_close_reopens() {
        let (bridge, probe) = bridge_with(1, 0);
        bridge.register_producer(1);
        bridge.close();
        assert!(!bridge.is_connected());

        // The next structural change renegotiates over the full layout,
        // closed or not.
        let b = bridge.register_producer(2);
        assert!(bridge.is_connected());
        assert_eq!(bridge.offset_of(b), Some(1));
        assert_eq!(probe.open_channels(), Some((0, 3)));
    }

    #[test]
    fn test_events_cover_transport_lifecycle() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let transport = MockTransport::with_block_size(1);
        let bridge = AudioBridge::builder()
            .transport(transport)
            .config(BridgeConfig {
                block_size: 1,
                input_channels: 0,
            })
            .on_event(move |event| sink.lock().push(event))
            .start()
            .unwrap();

        bridge.register_producer(2);
        bridge.close();

        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            BridgeEvent::LayoutChanged {
                producers: 1,
                total_channels: 2,
            }
        ));
        assert!(matches!(
            events[1],
            BridgeEvent::TransportOpened {
                inputs: 0,
                outputs: 2,
            }
        ));
        assert!(matches!(events[2], BridgeEvent::TransportClosed));
    }
}
