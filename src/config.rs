//! Configuration for the exchange loop.

/// Configuration for [`ExchangeLoop`](crate::ExchangeLoop) behavior.
///
/// Use [`ExchangeConfig::default()`] for the low-CPU defaults, or
/// [`ExchangeConfig::busy_poll()`] when latency matters more than idle CPU.
///
/// # Example
///
/// ```
/// use audio_exchange::ExchangeConfig;
///
/// let config = ExchangeConfig {
///     adaptive_sleep: false,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ExchangeConfig {
    /// Whether the loop naps between iterations.
    ///
    /// When enabled, each iteration sleeps for roughly the previous
    /// iteration's non-transfer time, clamped so the nap never exceeds one
    /// sample period of the slowest input per registered route. Disabling
    /// this busy-polls: lowest latency, one core pinned.
    ///
    /// Default: `true`
    pub adaptive_sleep: bool,

    /// Whether to measure per-iteration timings.
    ///
    /// Timings drive the adaptive sleep computation and are reported via
    /// [`ExchangeLoop::diagnostics`]. With measurement off the recorded
    /// durations stay at their last values and the adaptive delay degrades
    /// to zero.
    ///
    /// Default: `true`
    ///
    /// [`ExchangeLoop::diagnostics`]: crate::ExchangeLoop::diagnostics
    pub measure: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            adaptive_sleep: true,
            measure: true,
        }
    }
}

impl ExchangeConfig {
    /// Configuration that never sleeps between iterations.
    #[must_use]
    pub fn busy_poll() -> Self {
        Self {
            adaptive_sleep: false,
            measure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ExchangeConfig::default();
        assert!(config.adaptive_sleep);
        assert!(config.measure);
    }

    #[test]
    fn test_config_busy_poll() {
        let config = ExchangeConfig::busy_poll();
        assert!(!config.adaptive_sleep);
        assert!(!config.measure);
    }
}
