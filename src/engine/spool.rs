//! Holding area for sub-buffers that arrive while no transport is live.
//!
//! During renegotiation (and after a failed open) producers keep submitting.
//! Each producer's latest sub-buffer is kept here (last write wins, one
//! entry per slot, storage preallocated off the audio thread) and replayed
//! into the fresh mix buffer the moment a transport comes up, so their
//! audio joins the first live block instead of being lost.

use crate::engine::aggregator::{interleave_into, BlockAggregator, SubmitMark};
use crate::registry::ChannelLayout;

/// One slot's pending sub-buffer.
#[derive(Debug)]
struct SpoolEntry {
    /// True when `samples` holds a not-yet-replayed submission.
    filled: bool,
    /// Preallocated to exactly one sub-buffer for this slot.
    samples: Vec<f32>,
}

/// Per-slot spool storage, parallel to the layout's slot list.
#[derive(Debug)]
pub(crate) struct SpoolBuffer {
    entries: Vec<SpoolEntry>,
    occupied: usize,
}

impl SpoolBuffer {
    /// Allocates spool storage for every slot of the layout. Control thread
    /// only; the audio thread then stores into the prepared buffers.
    pub(crate) fn for_layout(layout: &ChannelLayout, block_size: usize) -> Self {
        let entries = layout
            .slots()
            .iter()
            .map(|slot| SpoolEntry {
                filled: false,
                samples: vec![0.0; block_size * slot.channels],
            })
            .collect();
        Self {
            entries,
            occupied: 0,
        }
    }

    /// Stores a producer's sub-buffer, overwriting any earlier one from the
    /// same slot. Allocation-free.
    pub(crate) fn store(&mut self, slot_index: usize, samples: &[f32]) -> SubmitMark {
        let entry = &mut self.entries[slot_index];
        debug_assert_eq!(entry.samples.len(), samples.len());
        let len = entry.samples.len().min(samples.len());
        entry.samples[..len].copy_from_slice(&samples[..len]);

        if entry.filled {
            SubmitMark::Duplicate
        } else {
            entry.filled = true;
            self.occupied += 1;
            SubmitMark::First
        }
    }

    /// Number of slots holding a pending sub-buffer.
    pub(crate) fn occupied(&self) -> usize {
        self.occupied
    }

    /// Discards all pending sub-buffers, keeping the storage.
    /// Allocation-free.
    pub(crate) fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.filled = false;
        }
        self.occupied = 0;
    }

    /// Replays every pending sub-buffer into `mix`, marking each producer
    /// reported, then clears the spool. Returns how many were replayed.
    ///
    /// Runs under the engine lock at transport creation; bounded by one
    /// block of every producer's channels.
    pub(crate) fn replay_into(
        &mut self,
        layout: &ChannelLayout,
        mix: &mut [f32],
        block: &mut BlockAggregator,
    ) -> usize {
        let mut replayed = 0;
        for (slot_index, entry) in self.entries.iter().enumerate() {
            if !entry.filled {
                continue;
            }
            let slot = &layout.slots()[slot_index];
            if slot.channels == 0 {
                continue;
            }
            interleave_into(
                mix,
                layout.total_channels(),
                slot.offset,
                slot.channels,
                &entry.samples,
            );
            block.mark(slot_index);
            replayed += 1;
        }
        self.clear();
        replayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelRegistry;
    use std::sync::Arc;

    fn layout_of(counts: &[usize]) -> Arc<ChannelLayout> {
        let mut reg = ChannelRegistry::new();
        for &c in counts {
            reg.register(c);
        }
        reg.snapshot()
    }

    #[test]
    fn test_store_tracks_occupancy() {
        let layout = layout_of(&[1, 2]);
        let mut spool = SpoolBuffer::for_layout(&layout, 4);

        assert_eq!(spool.occupied(), 0);
        assert_eq!(spool.store(0, &[0.1; 4]), SubmitMark::First);
        assert_eq!(spool.store(1, &[0.2; 8]), SubmitMark::First);
        assert_eq!(spool.occupied(), 2);
    }

    #[test]
    fn test_store_twice_is_last_write_wins() {
        let layout = layout_of(&[1]);
        let mut spool = SpoolBuffer::for_layout(&layout, 2);
        let mut block = BlockAggregator::for_layout(&layout);

        spool.store(0, &[0.1, 0.1]);
        assert_eq!(spool.store(0, &[0.7, 0.8]), SubmitMark::Duplicate);
        assert_eq!(spool.occupied(), 1);

        let mut mix = vec![0.0f32; 2];
        spool.replay_into(&layout, &mut mix, &mut block);
        assert_eq!(mix, vec![0.7, 0.8]);
    }

    #[test]
    fn test_replay_interleaves_and_marks() {
        let layout = layout_of(&[1, 2, 1]);
        let mut spool = SpoolBuffer::for_layout(&layout, 1);
        let mut block = BlockAggregator::for_layout(&layout);

        spool.store(0, &[0.5]);
        spool.store(1, &[0.1, 0.2]);

        let mut mix = vec![0.0f32; 4];
        let replayed = spool.replay_into(&layout, &mut mix, &mut block);

        assert_eq!(replayed, 2);
        assert_eq!(mix, vec![0.5, 0.1, 0.2, 0.0]);
        assert_eq!(block.reported_count(), 2);
        assert_eq!(spool.occupied(), 0);
    }

    #[test]
    fn test_clear_discards_without_replay() {
        let layout = layout_of(&[1]);
        let mut spool = SpoolBuffer::for_layout(&layout, 2);
        let mut block = BlockAggregator::for_layout(&layout);

        spool.store(0, &[0.9, 0.9]);
        spool.clear();
        assert_eq!(spool.occupied(), 0);

        let mut mix = vec![0.0f32; 2];
        assert_eq!(spool.replay_into(&layout, &mut mix, &mut block), 0);
        assert_eq!(mix, vec![0.0, 0.0]);
    }

    #[test]
    fn test_store_after_clear_reuses_storage() {
        let layout = layout_of(&[2]);
        let mut spool = SpoolBuffer::for_layout(&layout, 1);
        let mut block = BlockAggregator::for_layout(&layout);

        spool.store(0, &[0.1, 0.2]);
        spool.clear();
        assert_eq!(spool.store(0, &[0.3, 0.4]), SubmitMark::First);

        let mut mix = vec![0.0f32; 2];
        spool.replay_into(&layout, &mut mix, &mut block);
        assert_eq!(mix, vec![0.3, 0.4]);
    }
}
