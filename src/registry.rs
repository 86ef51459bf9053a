//! Producer registration and the derived channel layout.
//!
//! [`ChannelRegistry`] is the control-plane source of truth: which producers
//! exist and how many channels each contributes. Every structural change
//! produces a fresh immutable [`ChannelLayout`] snapshot; the bridge swaps
//! the snapshot into the real-time path whole, so the audio thread never
//! observes a half-updated offset table.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::BridgeError;
use crate::producer::ProducerId;

/// One producer's slot in a layout snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutSlot {
    /// The producer occupying this slot.
    pub id: ProducerId,
    /// Channels this producer contributes. Zero means the producer has
    /// registered but not yet reported a channel count; it still reserves
    /// one slot in the total (see [`ChannelLayout::total_channels`]).
    pub channels: usize,
    /// First mix-buffer channel assigned to this producer. Its samples span
    /// `offset .. offset + channels` within each frame.
    pub offset: usize,
}

/// Immutable view of the registry at one point in time.
///
/// Offsets are assigned by ascending registration order: the first
/// registered producer gets offset 0, each later one starts where the
/// previous one's channels end. Recomputation is deterministic, so two
/// snapshots of the same mapping are identical apart from their generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Slots sorted by ascending id (= registration order; ids are never
    /// reused).
    slots: Vec<LayoutSlot>,
    total_channels: usize,
    contributing: usize,
    generation: u64,
}

impl ChannelLayout {
    /// The layout of an empty registry, generation 0.
    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self {
            slots: Vec::new(),
            total_channels: 0,
            contributing: 0,
            generation: 0,
        })
    }

    fn compute(entries: &BTreeMap<ProducerId, usize>, generation: u64) -> Arc<Self> {
        let mut slots = Vec::with_capacity(entries.len());
        let mut offset = 0;
        let mut contributing = 0;
        for (&id, &channels) in entries {
            slots.push(LayoutSlot {
                id,
                channels,
                offset,
            });
            offset += channels;
            if channels > 0 {
                contributing += 1;
            }
        }
        // At least one slot per registered producer must exist even before
        // its channel count is known.
        let total_channels = offset.max(entries.len());
        Arc::new(Self {
            slots,
            total_channels,
            contributing,
            generation,
        })
    }

    /// Total channels the external connection must expose for this layout:
    /// the sum of all producers' channel counts, or the producer count if
    /// that sum is smaller.
    #[must_use]
    pub fn total_channels(&self) -> usize {
        self.total_channels
    }

    /// Number of registered producers.
    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of producers expected to report each block: those with a
    /// known, nonzero channel count. Producers that have only reserved a
    /// slot cannot contribute samples yet and are not waited for.
    #[must_use]
    pub fn contributing_producers(&self) -> usize {
        self.contributing
    }

    /// True if no producers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Monotonic change counter; bumped on every structural registry change.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// All slots in offset order.
    #[must_use]
    pub fn slots(&self) -> &[LayoutSlot] {
        &self.slots
    }

    /// Position of a producer's slot, if registered. Allocation-free
    /// (binary search over the sorted slot list), safe on the audio thread.
    #[must_use]
    pub fn slot_index(&self, id: ProducerId) -> Option<usize> {
        self.slots.binary_search_by_key(&id, |s| s.id).ok()
    }

    /// The slot for a producer, if registered.
    #[must_use]
    pub fn slot(&self, id: ProducerId) -> Option<&LayoutSlot> {
        self.slot_index(id).map(|i| &self.slots[i])
    }

    /// The first mix-buffer channel assigned to a producer.
    #[must_use]
    pub fn offset_of(&self, id: ProducerId) -> Option<usize> {
        self.slot(id).map(|s| s.offset)
    }

    /// The channel count a producer registered with.
    #[must_use]
    pub fn channels_of(&self, id: ProducerId) -> Option<usize> {
        self.slot(id).map(|s| s.channels)
    }
}

/// Tracks registered producers and their channel counts.
///
/// All mutation happens on the control thread; each mutating call returns
/// the resulting [`ChannelLayout`] snapshot for the caller to publish. The
/// registry itself holds no buffers and performs no I/O, which keeps it
/// trivially testable.
#[derive(Debug)]
pub struct ChannelRegistry {
    entries: BTreeMap<ProducerId, usize>,
    next_id: u32,
    generation: u64,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 0,
            generation: 0,
        }
    }

    /// Registers a new producer and returns its id plus the new layout.
    ///
    /// `channels` may be 0 when the producer's channel count is not yet
    /// known (it still reserves one slot in the total); report the real
    /// count later via [`update`](Self::update). Ids ascend and are never
    /// reused, so registration order is recoverable from id order.
    pub fn register(&mut self, channels: usize) -> (ProducerId, Arc<ChannelLayout>) {
        let id = ProducerId::new(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, channels);
        self.generation += 1;
        tracing::info!(%id, channels, "registered producer");
        (id, self.snapshot())
    }

    /// Replaces a producer's channel count and returns the new layout.
    ///
    /// Setting the same count again is a no-op: the mapping did not change,
    /// so no new generation (and no downstream reset) is produced.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownProducer`] if `id` is not registered.
    pub fn update(
        &mut self,
        id: ProducerId,
        channels: usize,
    ) -> Result<Arc<ChannelLayout>, BridgeError> {
        match self.entries.get_mut(&id) {
            Some(current) if *current == channels => {
                tracing::debug!(%id, channels, "channel count unchanged, keeping layout");
                Ok(self.snapshot())
            }
            Some(current) => {
                let previous = *current;
                *current = channels;
                self.generation += 1;
                tracing::info!(%id, previous, channels, "updated producer channel count");
                Ok(self.snapshot())
            }
            None => Err(BridgeError::UnknownProducer { id }),
        }
    }

    /// Removes a producer and returns the new layout.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownProducer`] if `id` is not registered.
    pub fn unregister(&mut self, id: ProducerId) -> Result<Arc<ChannelLayout>, BridgeError> {
        if self.entries.remove(&id).is_none() {
            return Err(BridgeError::UnknownProducer { id });
        }
        self.generation += 1;
        tracing::info!(%id, "unregistered producer");
        Ok(self.snapshot())
    }

    /// Removes every producer (session restart). Idempotent: resetting an
    /// already-empty registry keeps the current generation.
    pub fn reset(&mut self) -> Arc<ChannelLayout> {
        if !self.entries.is_empty() {
            let removed = self.entries.len();
            self.entries.clear();
            self.generation += 1;
            tracing::info!(removed, "registry reset");
        }
        self.snapshot()
    }

    /// The current layout snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ChannelLayout> {
        ChannelLayout::compute(&self.entries, self.generation)
    }

    /// True if the producer is registered.
    #[must_use]
    pub fn contains(&self, id: ProducerId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered producers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no producers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
