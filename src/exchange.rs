//! The exchange loop: one background thread moving bytes from inputs to
//! outputs.
//!
//! Each pass drains every active route and fans the captured bytes out to
//! that route's processors. Between passes the loop naps for roughly the
//! previous pass's non-transfer time, clamped so a stall can never starve
//! the streams for more than one sample period of the slowest input per
//! route. Routes whose consumer set has emptied are stopped and removed as
//! part of the pass.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ExchangeConfig;
use crate::event::{EventCallback, ExchangeEvent};
use crate::registry::RouteRegistry;
use crate::ExchangeError;

/// Timing snapshot from the exchange loop.
///
/// Returned by [`ExchangeLoop::diagnostics`]; useful for debug overlays and
/// for judging how much headroom the loop has.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeDiagnostics {
    /// Largest per-sample period across registered inputs (the sleep bound).
    pub max_interval: Duration,
    /// Wall time of the most recent full pass.
    pub last_iteration: Duration,
    /// Portion of the most recent pass spent actually moving audio.
    pub last_transfer: Duration,
}

/// The engine's polling loop.
///
/// Started once - on a dedicated background thread or the caller's own -
/// and runs until the process exits; there is no stop. Callers interact with
/// it only indirectly, by mutating routes, consumers, and control values.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use audio_exchange::{ExchangeConfig, ExchangeLoop, RouteRegistry};
///
/// let registry = Arc::new(RouteRegistry::new());
/// let exchange = Arc::new(ExchangeLoop::new(registry, ExchangeConfig::default()));
/// assert!(!exchange.is_running());
/// ```
pub struct ExchangeLoop {
    registry: Arc<RouteRegistry>,
    running: AtomicBool,
    sleep_enabled: AtomicBool,
    measure_enabled: AtomicBool,
    last_iteration_nanos: AtomicU64,
    last_transfer_nanos: AtomicU64,
    event_callback: Option<EventCallback>,
}

impl ExchangeLoop {
    /// Creates a loop over the given registry.
    pub fn new(registry: Arc<RouteRegistry>, config: ExchangeConfig) -> Self {
        Self {
            registry,
            running: AtomicBool::new(false),
            sleep_enabled: AtomicBool::new(config.adaptive_sleep),
            measure_enabled: AtomicBool::new(config.measure),
            last_iteration_nanos: AtomicU64::new(0),
            last_transfer_nanos: AtomicU64::new(0),
            event_callback: None,
        }
    }

    /// Registers a callback for runtime events (route failures, pruning).
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Starts the loop.
    ///
    /// With `background = true` the loop runs on a dedicated, detached
    /// thread and this call returns immediately. With `background = false`
    /// it takes over the calling thread and never returns.
    ///
    /// Returns `Ok(false)` without doing anything if the loop is already
    /// running.
    ///
    /// # Errors
    ///
    /// `Backend` if the background thread cannot be spawned (the loop is
    /// then marked not running, so the call may be retried).
    pub fn start(self: Arc<Self>, background: bool) -> Result<bool, ExchangeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        if background {
            let exchange = Arc::clone(&self);
            let spawned = std::thread::Builder::new()
                .name("audio-exchange".to_string())
                .spawn(move || exchange.run());
            if let Err(e) = spawned {
                self.running.store(false, Ordering::SeqCst);
                return Err(ExchangeError::Backend(format!(
                    "failed to spawn exchange thread: {e}"
                )));
            }
        } else {
            self.run();
        }
        Ok(true)
    }

    /// Returns `true` once the loop has been started.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Enables or disables the adaptive nap between passes.
    pub fn set_sleep(&self, enabled: bool) {
        self.sleep_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flips the adaptive nap on or off, returning the new state.
    ///
    /// `measure` sets whether timing measurement stays on; measurements are
    /// what the nap computation feeds on, so turning both off pins a core.
    pub fn toggle_sleep(&self, measure: bool) -> bool {
        self.measure_enabled.store(measure, Ordering::SeqCst);
        let was_enabled = self.sleep_enabled.fetch_xor(true, Ordering::SeqCst);
        !was_enabled
    }

    /// Current timing snapshot.
    pub fn diagnostics(&self) -> ExchangeDiagnostics {
        ExchangeDiagnostics {
            max_interval: self.registry.max_interval(),
            last_iteration: Duration::from_nanos(self.last_iteration_nanos.load(Ordering::SeqCst)),
            last_transfer: Duration::from_nanos(self.last_transfer_nanos.load(Ordering::SeqCst)),
        }
    }

    fn run(&self) {
        tracing::info!("exchange loop running");
        loop {
            self.iterate();
        }
    }

    /// One full pass over the route snapshot.
    pub(crate) fn iterate(&self) {
        if self.sleep_enabled.load(Ordering::SeqCst) {
            std::thread::sleep(self.adaptive_delay());
        }

        let measure = self.measure_enabled.load(Ordering::SeqCst);
        let pass_start = Instant::now();
        let mut transfer = Duration::ZERO;

        let routes = self.registry.snapshot();
        for route in routes.iter() {
            if !route.is_active() {
                continue;
            }
            if !route.has_consumers() {
                // Self-pruning: the last consumer detached since the
                // previous pass.
                route.stop();
                self.registry.remove(route);
                tracing::debug!(input = %route.input_id(), "route pruned");
                self.emit(ExchangeEvent::RouteRemoved {
                    input: route.input_id(),
                });
                continue;
            }

            let poll_start = Instant::now();
            if let Err(error) = route.pump() {
                tracing::warn!(input = %route.input_id(), %error, "route transfer failed");
                self.emit(ExchangeEvent::RouteFailed {
                    input: route.input_id(),
                    error: error.to_string(),
                });
            }
            if measure {
                transfer += poll_start.elapsed();
            }
        }

        if measure {
            self.last_transfer_nanos
                .store(duration_nanos(transfer), Ordering::SeqCst);
            self.last_iteration_nanos
                .store(duration_nanos(pass_start.elapsed()), Ordering::SeqCst);
        }
    }

    /// Nap duration derived from the previous pass.
    ///
    /// The idle time of the last pass (iteration minus transfer) is a good
    /// estimate of how long the loop can afford to sleep now. A negative
    /// difference or one beyond `max_interval x route count` means the
    /// estimate is stale or the clock hiccuped; both collapse to zero so a
    /// bad estimate can only cost CPU, never audio.
    fn adaptive_delay(&self) -> Duration {
        let iteration = i128::from(self.last_iteration_nanos.load(Ordering::SeqCst));
        let transfer = i128::from(self.last_transfer_nanos.load(Ordering::SeqCst));
        let delay = iteration - transfer;

        let route_count = self.registry.snapshot().len() as i128;
        let bound = self.registry.max_interval().as_nanos() as i128 * route_count;

        if delay < 0 || delay > bound {
            Duration::ZERO
        } else {
            Duration::from_nanos(delay as u64)
        }
    }

    fn emit(&self, event: ExchangeEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{InputDevice, MockInput, MockOutput, OutputDevice};
    use crate::event::event_callback;
    use parking_lot::Mutex;

    fn exchange_over(registry: Arc<RouteRegistry>) -> Arc<ExchangeLoop> {
        // Sleepless config keeps single-iteration tests deterministic.
        Arc::new(ExchangeLoop::new(registry, ExchangeConfig::busy_poll()))
    }

    #[test]
    fn test_one_pass_moves_gain_adjusted_audio() {
        let registry = Arc::new(RouteRegistry::new());
        let exchange = exchange_over(registry.clone());

        let input = Arc::new(MockInput::new("mic", 44100, 64));
        let output = Arc::new(MockOutput::new("speaker"));
        let route = registry.get_or_create(input.clone());
        route.attach(output.clone()).unwrap();
        route.start().unwrap();

        input.push_samples(&[1000, -1000, 250]);
        exchange.iterate();

        let expected: Vec<u8> = [1000i16, -1000, 250]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(output.writes(), vec![expected]);
    }

    #[test]
    fn test_inactive_routes_are_skipped() {
        let registry = Arc::new(RouteRegistry::new());
        let exchange = exchange_over(registry.clone());

        let input = Arc::new(MockInput::new("mic", 44100, 64));
        let output = Arc::new(MockOutput::new("speaker"));
        let route = registry.get_or_create(input.clone());
        route.attach(output.clone()).unwrap();
        // Route never started.

        input.push_samples(&[42]);
        exchange.iterate();

        assert_eq!(output.write_count(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_consumerless_route_is_pruned() {
        let registry = Arc::new(RouteRegistry::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let exchange = Arc::new(
            ExchangeLoop::new(registry.clone(), ExchangeConfig::busy_poll())
                .with_event_callback(event_callback(move |e| sink.lock().push(e))),
        );

        let input = Arc::new(MockInput::new("mic", 44100, 64));
        let output = Arc::new(MockOutput::new("speaker"));
        let route = registry.get_or_create(input.clone());
        route.attach(output.clone()).unwrap();
        route.start().unwrap();

        route.detach(&output.id());
        exchange.iterate();

        assert!(registry.is_empty());
        assert!(!route.is_active());
        assert!(!input.is_open());
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ExchangeEvent::RouteRemoved { .. }));
    }

    #[test]
    fn test_failing_route_does_not_stop_others() {
        let registry = Arc::new(RouteRegistry::new());
        let exchange = exchange_over(registry.clone());

        let bad_input = Arc::new(MockInput::new("bad mic", 44100, 64));
        let bad_output = Arc::new(MockOutput::new("bad speaker"));
        let bad = registry.get_or_create(bad_input.clone());
        bad.attach(bad_output).unwrap();
        bad.start().unwrap();
        bad_input.push_samples(&[1]);
        bad_input.set_fail_reads(true);

        let good_input = Arc::new(MockInput::new("good mic", 44100, 64));
        let good_output = Arc::new(MockOutput::new("good speaker"));
        let good = registry.get_or_create(good_input.clone());
        good.attach(good_output.clone()).unwrap();
        good.start().unwrap();
        good_input.push_samples(&[7]);

        exchange.iterate();

        assert_eq!(good_output.write_count(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_adaptive_delay_clamps_to_zero_and_bound() {
        let registry = Arc::new(RouteRegistry::new());
        let exchange = exchange_over(registry.clone());

        // 44100Hz input -> 22675ns per sample; one route.
        let input = Arc::new(MockInput::new("mic", 44100, 64));
        let output = Arc::new(MockOutput::new("speaker"));
        let route = registry.get_or_create(input);
        route.attach(output).unwrap();
        route.start().unwrap();
        let bound = registry.max_interval().as_nanos() as u64 * registry.len() as u64;

        // Negative difference clamps to zero.
        exchange.last_iteration_nanos.store(100, Ordering::SeqCst);
        exchange.last_transfer_nanos.store(500, Ordering::SeqCst);
        assert_eq!(exchange.adaptive_delay(), Duration::ZERO);

        // Oversized difference clamps to zero, not to the bound.
        exchange
            .last_iteration_nanos
            .store(bound + 1_000_000, Ordering::SeqCst);
        exchange.last_transfer_nanos.store(0, Ordering::SeqCst);
        assert_eq!(exchange.adaptive_delay(), Duration::ZERO);

        // In-range difference passes through.
        exchange
            .last_iteration_nanos
            .store(bound / 2, Ordering::SeqCst);
        exchange.last_transfer_nanos.store(0, Ordering::SeqCst);
        assert_eq!(
            exchange.adaptive_delay(),
            Duration::from_nanos(bound / 2)
        );

        // The bound itself is still allowed.
        exchange.last_iteration_nanos.store(bound, Ordering::SeqCst);
        assert_eq!(exchange.adaptive_delay(), Duration::from_nanos(bound));
    }

    #[test]
    fn test_adaptive_delay_with_empty_registry_is_zero() {
        let registry = Arc::new(RouteRegistry::new());
        let exchange = exchange_over(registry);

        exchange.last_iteration_nanos.store(1000, Ordering::SeqCst);
        exchange.last_transfer_nanos.store(0, Ordering::SeqCst);
        assert_eq!(exchange.adaptive_delay(), Duration::ZERO);
    }

    #[test]
    fn test_measurement_records_timings() {
        let registry = Arc::new(RouteRegistry::new());
        let exchange = Arc::new(ExchangeLoop::new(
            registry.clone(),
            ExchangeConfig {
                adaptive_sleep: false,
                measure: true,
            },
        ));

        let input = Arc::new(MockInput::new("mic", 44100, 64));
        let output = Arc::new(MockOutput::new("speaker"));
        let route = registry.get_or_create(input.clone());
        route.attach(output).unwrap();
        route.start().unwrap();
        input.push_samples(&[1, 2, 3]);

        exchange.iterate();

        let diagnostics = exchange.diagnostics();
        assert!(diagnostics.last_iteration >= diagnostics.last_transfer);
        assert!(diagnostics.last_iteration > Duration::ZERO);
        assert_eq!(
            diagnostics.max_interval,
            Duration::from_nanos(1_000_000_000 / 44100)
        );
    }

    #[test]
    fn test_toggle_sleep_flips_and_reports() {
        let registry = Arc::new(RouteRegistry::new());
        let exchange = Arc::new(ExchangeLoop::new(registry, ExchangeConfig::default()));

        assert!(!exchange.toggle_sleep(true));
        assert!(exchange.toggle_sleep(true));
    }

    #[test]
    fn test_second_start_is_rejected() {
        let registry = Arc::new(RouteRegistry::new());
        let exchange = Arc::new(ExchangeLoop::new(registry, ExchangeConfig::default()));

        assert!(exchange.clone().start(true).unwrap());
        assert!(!exchange.clone().start(true).unwrap());
        assert!(exchange.is_running());
    }
}
