//! Per-block accumulation state.
//!
//! One block is complete when every producer expected to contribute has
//! submitted once. The aggregator tracks the reported set as per-slot flags
//! sized to the current layout, so duplicate submissions are distinguishable
//! from new arrivals and the real-time path never allocates.

use crate::registry::ChannelLayout;

/// Whether a submission was the producer's first for this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitMark {
    /// First report from this producer this block.
    First,
    /// The producer already reported; its earlier sub-buffer was
    /// overwritten (last write wins).
    Duplicate,
}

/// Reported-set tracker for the in-progress block.
///
/// Rebuilt (off the audio thread) whenever the layout changes; `mark` and
/// `clear` are the only operations the audio thread uses.
#[derive(Debug)]
pub(crate) struct BlockAggregator {
    /// Reported flag per layout slot.
    reported: Vec<bool>,
    /// Count of set flags, kept in step so completion checks are O(1).
    reported_count: usize,
}

impl BlockAggregator {
    /// Creates a tracker sized for the given layout.
    pub(crate) fn for_layout(layout: &ChannelLayout) -> Self {
        Self {
            reported: vec![false; layout.producer_count()],
            reported_count: 0,
        }
    }

    /// Marks a slot as reported. Allocation-free.
    pub(crate) fn mark(&mut self, slot_index: usize) -> SubmitMark {
        debug_assert!(slot_index < self.reported.len());
        if self.reported[slot_index] {
            SubmitMark::Duplicate
        } else {
            self.reported[slot_index] = true;
            self.reported_count += 1;
            SubmitMark::First
        }
    }

    /// True once `expected` distinct producers have reported.
    ///
    /// Never true for an empty expectation: a block with no contributing
    /// producers has nothing to flush.
    pub(crate) fn is_complete(&self, expected: usize) -> bool {
        expected > 0 && self.reported_count >= expected
    }

    /// Number of distinct producers reported this block.
    pub(crate) fn reported_count(&self) -> usize {
        self.reported_count
    }

    /// Forgets all reports, starting the next block. Allocation-free.
    pub(crate) fn clear(&mut self) {
        self.reported.fill(false);
        self.reported_count = 0;
    }
}

/// Writes one producer's sub-buffer into the interleaved mix buffer.
///
/// `samples` is frame-major with `channels` interleaved channels; frame `i`,
/// channel `c` lands at `mix[i * total_channels + offset + c]`.
pub(crate) fn interleave_into(
    mix: &mut [f32],
    total_channels: usize,
    offset: usize,
    channels: usize,
    samples: &[f32],
) {
    debug_assert!(channels > 0);
    debug_assert!(offset + channels <= total_channels);
    debug_assert_eq!(samples.len() % channels, 0);
    debug_assert_eq!(
        mix.len(),
        samples.len() / channels * total_channels,
        "mix buffer not sized for this layout"
    );

    for (i, frame) in samples.chunks_exact(channels).enumerate() {
        let base = i * total_channels + offset;
        mix[base..base + channels].copy_from_slice(frame);
    }
}
