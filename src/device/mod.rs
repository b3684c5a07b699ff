//! Device abstraction: identities, capture/playback traits, and backends.
//!
//! The engine never talks to audio hardware directly. It moves bytes between
//! anything implementing [`InputDevice`] and [`OutputDevice`]:
//!
//! - [`CpalInput`] / [`CpalOutput`]: CPAL-backed adapters for real hardware
//! - [`MockInput`] / [`MockOutput`]: in-memory devices for tests and CI
//!
//! Both traits take `&self` and require `Send + Sync`: device handles are
//! shared between caller threads (attach, gain changes) and the exchange
//! loop, so implementations use interior mutability.

mod cpal;
mod mock;

pub use self::cpal::{
    list_devices, probe_capability, CaptureStream, CpalInput, CpalOutput, PlaybackStream,
};
pub use self::mock::{MockInput, MockOutput};

use std::sync::Arc;

use crate::ExchangeError;

/// Stable identity of an audio device.
///
/// `DeviceId` keys the route registry and each route's consumer map, so it
/// must be stable for the lifetime of the device and cheap to clone and
/// compare. It wraps an `Arc<str>` (clone = pointer copy).
///
/// # Example
///
/// ```
/// use audio_exchange::DeviceId;
///
/// let mic = DeviceId::new("Built-in Microphone");
/// assert_eq!(mic, DeviceId::new("Built-in Microphone"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Creates a device identity from a string.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What directions a device supports, resolved once at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCapability {
    /// Capture only.
    Input,
    /// Playback only.
    Output,
    /// Both capture and playback.
    Duplex,
    /// Neither direction usable (e.g. a control-only endpoint).
    Neither,
}

impl DeviceCapability {
    /// Returns `true` if the device can capture audio.
    #[must_use]
    pub fn is_input(self) -> bool {
        matches!(self, Self::Input | Self::Duplex)
    }

    /// Returns `true` if the device can play audio.
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(self, Self::Output | Self::Duplex)
    }
}

/// A source of raw interleaved little-endian 16-bit audio bytes.
///
/// The exchange loop polls `available()` then `read()` each iteration;
/// callers drive the open/start lifecycle through
/// [`AudioRoute::start`](crate::AudioRoute::start).
pub trait InputDevice: Send + Sync {
    /// Stable identity; keys the route registry.
    fn id(&self) -> DeviceId;

    /// Acquires the device. Idempotent on an already-open device.
    fn open(&self) -> Result<(), ExchangeError>;

    /// Begins capture. The device must be open.
    fn start(&self) -> Result<(), ExchangeError>;

    /// Halts capture without releasing the device.
    fn stop(&self);

    /// Releases the device.
    fn close(&self);

    /// Returns `true` if the device is currently acquired.
    fn is_open(&self) -> bool;

    /// Returns `true` if the device is currently capturing.
    fn is_active(&self) -> bool;

    /// Number of captured bytes ready to read without blocking.
    fn available(&self) -> usize;

    /// Reads up to `buf.len()` bytes into `buf`, returning the count read.
    ///
    /// Never blocks. A failure (device vanished, stream closed) makes the
    /// loop skip this route for the current iteration only.
    fn read(&self, buf: &mut [u8]) -> Result<usize, ExchangeError>;

    /// The device's native buffer capacity in bytes.
    ///
    /// Sizes the route's shared capture buffer and every consumer's output
    /// buffer at attach time.
    fn buffer_capacity(&self) -> usize;

    /// Sample rate in Hz; bounds the exchange loop's adaptive sleep.
    fn sample_rate(&self) -> u32;
}

/// A sink accepting raw interleaved little-endian 16-bit audio bytes.
pub trait OutputDevice: Send + Sync {
    /// Stable identity; keys a route's consumer map.
    fn id(&self) -> DeviceId;

    /// Acquires the device. Idempotent on an already-open device.
    fn open(&self) -> Result<(), ExchangeError>;

    /// Begins playback. The device must be open.
    fn start(&self) -> Result<(), ExchangeError>;

    /// Halts playback without releasing the device.
    fn stop(&self);

    /// Releases the device.
    fn close(&self);

    /// Returns `true` if the device is currently acquired.
    fn is_open(&self) -> bool;

    /// Discards queued, not-yet-played audio.
    fn flush(&self);

    /// Blocks briefly until queued audio has been played out.
    fn drain(&self);

    /// Queues `buf` for playback.
    ///
    /// Never blocks. A failure makes the loop skip the rest of this route's
    /// pass for the current iteration only.
    fn write(&self, buf: &[u8]) -> Result<(), ExchangeError>;
}
