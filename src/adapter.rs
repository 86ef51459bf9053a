//! Per-producer channel shaping and the host-facing gain passthrough.
//!
//! A producer's host input is frame-major interleaved across its physical
//! channels. Before submission the adapter shapes it into the sub-buffer the
//! aggregator expects: either the channels as-is (object mode) or a per-frame
//! sum into one channel (mono-downmix mode). Shaping is a pure per-block
//! function, so a mode change between blocks simply shapes the next block the
//! new way.

/// How one producer's physical input channels map onto logical channels in
/// the aggregated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// Each physical input channel becomes its own logical channel,
    /// contributed to a distinct slot of the mix buffer.
    #[default]
    Object,

    /// All physical input channels are summed per frame into one logical
    /// channel. Sum, not average: two correlated channels add constructively,
    /// matching how the host sums graph inputs.
    MonoMix,
}

/// Returns the channel count a producer should register with.
///
/// One channel in mono-downmix mode, the physical count in object mode.
#[inline]
#[must_use]
pub fn registered_channels(mode: ChannelMode, physical_channels: usize) -> usize {
    match mode {
        ChannelMode::Object => physical_channels,
        ChannelMode::MonoMix => 1,
    }
}

/// Returns the sub-buffer length produced by shaping `frames` frames of
/// input in the given mode.
#[inline]
#[must_use]
pub fn shaped_len(mode: ChannelMode, physical_channels: usize, frames: usize) -> usize {
    registered_channels(mode, physical_channels) * frames
}

/// Shapes one block of interleaved producer input into a sub-buffer.
///
/// `input` holds `channels` interleaved physical channels; `out` must be
/// exactly [`shaped_len`] long. Writes into the caller's buffer so the
/// real-time path never allocates.
///
/// Object mode copies the input through unchanged; mono-downmix sums the
/// channels of each frame into one sample.
pub fn shape_into(mode: ChannelMode, input: &[f32], channels: usize, out: &mut [f32]) {
    debug_assert!(channels > 0, "shape_into on zero channels");
    if channels == 0 {
        return;
    }
    debug_assert_eq!(input.len() % channels, 0, "input not frame-aligned");
    debug_assert_eq!(out.len(), shaped_len(mode, channels, input.len() / channels));

    match mode {
        ChannelMode::Object => {
            let len = input.len().min(out.len());
            out[..len].copy_from_slice(&input[..len]);
        }
        ChannelMode::MonoMix => {
            for (frame, slot) in input.chunks_exact(channels).zip(out.iter_mut()) {
                *slot = frame.iter().sum();
            }
        }
    }
}

/// Host-facing passthrough: `output = input * gain`, per sample.
///
/// The producer's contribution to the host mixing graph is independent of
/// the aggregation path; the host always receives the producer's own input,
/// scaled.
#[inline]
pub fn apply_output_gain(input: &[f32], output: &mut [f32], gain: f32) {
    debug_assert_eq!(input.len(), output.len());
    for (o, &i) in output.iter_mut().zip(input.iter()) {
        *o = i * gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_channels() {
        assert_eq!(registered_channels(ChannelMode::Object, 2), 2);
        assert_eq!(registered_channels(ChannelMode::Object, 6), 6);
        assert_eq!(registered_channels(ChannelMode::MonoMix, 2), 1);
        assert_eq!(registered_channels(ChannelMode::MonoMix, 6), 1);
    }

    #[test]
    fn test_shape_object_passthrough() {
        let input = [0.1f32, 0.2, 0.3, 0.4]; // 2 frames, 2 channels
        let mut out = [0.0f32; 4];
        shape_into(ChannelMode::Object, &input, 2, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn test_shape_mono_sums_per_frame() {
        let input = [0.1f32, 0.2, 0.3, 0.4]; // 2 frames, 2 channels
        let mut out = [0.0f32; 2];
        shape_into(ChannelMode::MonoMix, &input, 2, &mut out);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_shape_mono_cancellation() {
        // Opposite-phase channels should cancel
        let input = [0.5f32, -0.5];
        let mut out = [1.0f32];
        shape_into(ChannelMode::MonoMix, &input, 2, &mut out);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_shape_mono_single_channel_is_copy() {
        let input = [0.25f32, -0.75, 0.5];
        let mut out = [0.0f32; 3];
        shape_into(ChannelMode::MonoMix, &input, 1, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn test_apply_output_gain() {
        let input = [1.0f32, -0.5, 0.25];
        let mut output = [0.0f32; 3];
        apply_output_gain(&input, &mut output, 0.5);
        assert_eq!(output, [0.5, -0.25, 0.125]);
    }

    #[test]
    fn test_apply_output_gain_unity_and_mute() {
        let input = [0.3f32, 0.6];
        let mut output = [9.0f32; 2];
        apply_output_gain(&input, &mut output, 1.0);
        assert_eq!(output, input);
        apply_output_gain(&input, &mut output, 0.0);
        assert_eq!(output, [0.0, 0.0]);
    }

    #[test]
    fn test_shaped_len() {
        assert_eq!(shaped_len(ChannelMode::Object, 4, 256), 1024);
        assert_eq!(shaped_len(ChannelMode::MonoMix, 4, 256), 256);
    }
}
