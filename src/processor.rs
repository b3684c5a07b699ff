//! Per-output sample processing: gain, stereo channel swap, mute.
//!
//! Each output device attached to a route gets its own [`SampleProcessor`].
//! All processors on a route read the same shared capture buffer; each owns
//! its private output buffer, so the transform never copies the raw bytes
//! except through the scaling pass itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::OutputDevice;
use crate::ExchangeError;

/// Maps a linear control value to a multiplicative gain factor.
///
/// The curve `0.001 * e^(6.908 * v)` stretches a control range of roughly
/// `[0.1, 1.5]` across a wide perceptual gain range: `v = 1.0` lands on
/// unity gain, `v = 1.5` on roughly 31x. Values below `0.1` clip to zero
/// gain (silence), which also keeps [`from_gain`] out of `ln(0)` territory.
///
/// # Example
///
/// ```
/// use audio_exchange::to_gain;
///
/// assert!((to_gain(1.0) - 1.0).abs() < 1e-3);
/// assert_eq!(to_gain(0.05), 0.0);
/// ```
#[must_use]
pub fn to_gain(linear: f64) -> f64 {
    if linear < 0.1 {
        0.0
    } else {
        0.001 * (6.908 * linear).exp()
    }
}

/// Maps a gain factor back to its linear control value.
///
/// Exact inverse of [`to_gain`] for any gain greater than zero.
#[must_use]
pub fn from_gain(gain: f64) -> f64 {
    (gain * 1000.0).ln() / 6.908
}

/// State touched only by the exchange loop thread.
struct ProcessorState {
    /// Deferred sample for the lagged channel swap.
    carry: i16,
    /// Gain-adjusted bytes ready for the output device.
    out: Vec<u8>,
}

/// Applies gain, optional channel swap, and optional mute to captured audio
/// and feeds the result to one output device.
///
/// Control values (gain factor, swap flag, mute flag) are single atomic
/// slots written by callers and read by the exchange loop without further
/// synchronization: a change becomes audible within one loop iteration,
/// which is plenty for UI-driven controls.
pub struct SampleProcessor {
    output: Arc<dyn OutputDevice>,
    gain_bits: AtomicU64,
    swap: AtomicBool,
    muted: AtomicBool,
    state: Mutex<ProcessorState>,
}

impl SampleProcessor {
    /// Creates a processor feeding `output`, with an output buffer sized to
    /// the owning route's capture buffer.
    pub(crate) fn new(output: Arc<dyn OutputDevice>, gain: f64, capacity: usize) -> Self {
        Self {
            output,
            gain_bits: AtomicU64::new(gain.to_bits()),
            swap: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            state: Mutex::new(ProcessorState {
                carry: 0,
                out: vec![0; capacity],
            }),
        }
    }

    /// The output device this processor feeds.
    pub fn output(&self) -> &Arc<dyn OutputDevice> {
        &self.output
    }

    /// Current gain factor (not the linear control value; see [`from_gain`]).
    pub fn gain(&self) -> f64 {
        f64::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    /// Sets the gain factor.
    pub fn set_gain(&self, gain: f64) {
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    /// Whether the lagged channel swap is enabled.
    pub fn swap_enabled(&self) -> bool {
        self.swap.load(Ordering::Relaxed)
    }

    /// Enables or disables the channel swap.
    pub fn set_swap(&self, enabled: bool) {
        self.swap.store(enabled, Ordering::Relaxed);
    }

    /// Whether this output is muted.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Mutes or unmutes this output.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Transforms `raw` into this processor's output buffer.
    ///
    /// Interprets consecutive byte pairs at even offsets as little-endian
    /// signed 16-bit samples, scales each by the gain factor, and writes the
    /// result back little-endian. With swap enabled, each scaled sample is
    /// exchanged with the one held over from the previous position, shifting
    /// every sample one slot later: a one-sample-lagged left/right swap.
    /// Empty input is a no-op.
    pub(crate) fn process(&self, raw: &[u8]) {
        if raw.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        let len = raw.len().min(state.out.len());

        if self.muted.load(Ordering::Relaxed) {
            // Carry is left alone so the swap picks up where it was on unmute.
            state.out[..len].fill(0);
            return;
        }

        let gain = f64::from_bits(self.gain_bits.load(Ordering::Relaxed));
        let swap = self.swap.load(Ordering::Relaxed);
        let ProcessorState { carry, out } = &mut *state;

        let mut i = 0;
        while i + 1 < len {
            let sample = i16::from_le_bytes([raw[i], raw[i + 1]]);
            // Truncating cast: gains that push a sample past the 16-bit
            // range wrap rather than clamp.
            let mut scaled = (f64::from(sample) * gain) as i32 as i16;
            if swap {
                scaled = std::mem::replace(carry, scaled);
            }
            let bytes = scaled.to_le_bytes();
            out[i] = bytes[0];
            out[i + 1] = bytes[1];
            i += 2;
        }
    }

    /// Sends the first `len` processed bytes to the output device.
    pub(crate) fn write_out(&self, len: usize) -> Result<(), ExchangeError> {
        let state = self.state.lock();
        let len = len.min(state.out.len());
        self.output.write(&state.out[..len])
    }
}
