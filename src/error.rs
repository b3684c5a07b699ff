//! Error types for audio-exchange.
//!
//! Errors are split into two categories:
//! - **Fatal to the operation** ([`ExchangeError::DeviceUnavailable`]):
//!   returned from [`AudioRoute::attach`] / [`AudioRoute::start`]; the
//!   operation aborts and no partial state is retained.
//! - **Recoverable** ([`ExchangeError::DeviceIo`]): a read or write failed
//!   mid-iteration. The exchange loop isolates the failure to the affected
//!   route, surfaces it via [`ExchangeEvent`](crate::ExchangeEvent), and
//!   keeps running.
//!
//! Gain, swap, or mute mutations that name an output device with no consumer
//! entry are silent no-ops by contract, never errors.
//!
//! [`AudioRoute::attach`]: crate::AudioRoute::attach
//! [`AudioRoute::start`]: crate::AudioRoute::start

/// Errors produced by device operations and the exchange engine.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// A device could not be opened or started.
    ///
    /// Surfaced to the caller of [`AudioRoute::attach`] or
    /// [`AudioRoute::start`]; the route is left exactly as it was before the
    /// call.
    ///
    /// [`AudioRoute::attach`]: crate::AudioRoute::attach
    /// [`AudioRoute::start`]: crate::AudioRoute::start
    #[error("device unavailable: {name}: {reason}")]
    DeviceUnavailable {
        /// Identity of the device that could not be opened or started.
        name: String,
        /// Why the device was unavailable.
        reason: String,
    },

    /// A read or write on an open device failed during an exchange pass.
    ///
    /// Never fatal to the loop: the affected route skips the rest of its
    /// iteration and other routes continue unaffected.
    #[error("device I/O failed: {name}: {reason}")]
    DeviceIo {
        /// Identity of the device that failed.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl ExchangeError {
    /// Creates a `DeviceUnavailable` error for the given device.
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `DeviceIo` error for the given device.
    pub fn io(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceIo {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
