//! Runtime events for monitoring the exchange loop.
//!
//! Events are non-fatal notifications. The loop continues running after any
//! event is emitted - they exist for logging and metrics, not error handling.

use std::sync::Arc;

use crate::device::DeviceId;

/// Runtime events emitted by the exchange loop.
///
/// These are informational, not errors. Register an [`EventCallback`] via
/// [`ExchangeLoop::with_event_callback`] to log them or update metrics.
///
/// [`ExchangeLoop::with_event_callback`]: crate::ExchangeLoop::with_event_callback
#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    /// A route's transfer failed during an iteration.
    ///
    /// The route skipped the rest of its pass; other routes were unaffected
    /// and the route will be polled again on the next iteration.
    RouteFailed {
        /// Identity of the route's input device.
        input: DeviceId,
        /// Description of the read or write failure.
        error: String,
    },

    /// A route whose consumer set became empty was stopped and removed.
    ///
    /// This is the loop's normal self-pruning of dead routes, emitted at
    /// most one iteration after the last consumer detaches.
    RouteRemoved {
        /// Identity of the removed route's input device.
        input: DeviceId,
    },
}

/// Callback type for receiving runtime events.
///
/// # Example
///
/// ```ignore
/// let exchange = ExchangeLoop::new(registry, ExchangeConfig::default())
///     .with_event_callback(event_callback(|e| tracing::warn!(?e, "exchange event")));
/// ```
pub type EventCallback = Arc<dyn Fn(ExchangeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// Convenience wrapper so callers don't have to `Arc` the closure themselves.
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(ExchangeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
