//! Registry of active routes, keyed by input-device identity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::device::{DeviceId, InputDevice};
use crate::route::AudioRoute;

/// Process-wide registry mapping input devices to their [`AudioRoute`].
///
/// Construct one explicitly and share it (via `Arc`) between callers and the
/// [`ExchangeLoop`](crate::ExchangeLoop); it lives for the life of the
/// process. Routes are added by [`get_or_create`](Self::get_or_create) and
/// removed lazily by the loop when their consumer set empties.
///
/// The registry also tracks the longest per-sample period across every input
/// ever registered, which bounds how long the loop may nap.
pub struct RouteRegistry {
    routes: Mutex<HashMap<DeviceId, Arc<AudioRoute>>>,
    snapshot: ArcSwap<Vec<Arc<AudioRoute>>>,
    max_interval_nanos: AtomicU64,
}

impl RouteRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
            max_interval_nanos: AtomicU64::new(0),
        }
    }

    /// Returns the route for `input`, creating and registering one if this
    /// is the first request for that device identity.
    ///
    /// Every call (hit or miss) folds the input's sample period into the
    /// registry's sleep bound: `max_interval` only ever grows.
    pub fn get_or_create(&self, input: Arc<dyn InputDevice>) -> Arc<AudioRoute> {
        let sample_rate = input.sample_rate().max(1);
        let route = {
            let mut routes = self.routes.lock();
            let mut created = false;
            let route = routes
                .entry(input.id())
                .or_insert_with(|| {
                    created = true;
                    Arc::new(AudioRoute::new(input))
                })
                .clone();
            if created {
                tracing::debug!(input = %route.input_id(), "route registered");
                self.publish(&routes);
            }
            route
        };

        let per_sample = 1_000_000_000 / u64::from(sample_rate);
        self.max_interval_nanos
            .fetch_max(per_sample, Ordering::SeqCst);
        route
    }

    /// Removes a route by its input-device identity.
    ///
    /// Called by the exchange loop when a route's consumer set has emptied.
    pub(crate) fn remove(&self, route: &AudioRoute) {
        let mut routes = self.routes.lock();
        if routes.remove(&route.input_id()).is_some() {
            self.publish(&routes);
        }
    }

    /// The current route snapshot, captured once per loop pass.
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<AudioRoute>>> {
        self.snapshot.load_full()
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    /// Returns `true` if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest per-sample period across all inputs ever registered.
    ///
    /// Zero until the first route is registered.
    pub fn max_interval(&self) -> Duration {
        Duration::from_nanos(self.max_interval_nanos.load(Ordering::SeqCst))
    }

    fn publish(&self, routes: &HashMap<DeviceId, Arc<AudioRoute>>) {
        self.snapshot
            .store(Arc::new(routes.values().cloned().collect()));
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
