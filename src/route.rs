//! A route: one input device fanned out to a set of output processors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::device::{DeviceId, InputDevice, OutputDevice};
use crate::processor::{from_gain, to_gain, SampleProcessor};
use crate::ExchangeError;

/// One input device bound to any number of output devices, each with its own
/// gain, swap, and mute settings.
///
/// Routes are created through [`RouteRegistry::get_or_create`] and pumped by
/// the [`ExchangeLoop`]; callers only mutate the consumer set and per-output
/// controls. All methods are callable from any thread and none of them
/// blocks on the loop.
///
/// The consumer map is mirrored into an immutable snapshot on every
/// mutation. The loop iterates only the snapshot, so a mutation becomes
/// audible at the start of the loop's next full pass - at most one iteration
/// of staleness.
///
/// [`RouteRegistry::get_or_create`]: crate::RouteRegistry::get_or_create
/// [`ExchangeLoop`]: crate::ExchangeLoop
pub struct AudioRoute {
    input: Arc<dyn InputDevice>,
    /// Capture scratch shared read-only with every consumer; written and
    /// read only on the exchange loop thread.
    buffer: Mutex<Vec<u8>>,
    consumers: Mutex<HashMap<DeviceId, Arc<SampleProcessor>>>,
    snapshot: ArcSwap<Vec<Arc<SampleProcessor>>>,
    active: AtomicBool,
}

impl AudioRoute {
    pub(crate) fn new(input: Arc<dyn InputDevice>) -> Self {
        let capacity = input.buffer_capacity();
        Self {
            input,
            buffer: Mutex::new(vec![0; capacity]),
            consumers: Mutex::new(HashMap::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
            active: AtomicBool::new(false),
        }
    }

    /// Identity of this route's input device.
    pub fn input_id(&self) -> DeviceId {
        self.input.id()
    }

    /// Returns `true` once [`start`](Self::start) has succeeded and until
    /// [`stop`](Self::stop).
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of output devices currently attached.
    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }

    pub(crate) fn has_consumers(&self) -> bool {
        !self.snapshot.load().is_empty()
    }

    /// Attaches an output device as a consumer of this route.
    ///
    /// Opens and starts the device if it is not already open, then registers
    /// a processor at unity gain. Re-attaching an already-attached device is
    /// a no-op. Returns the capture buffer capacity in bytes.
    ///
    /// # Errors
    ///
    /// `DeviceUnavailable` if the device cannot be opened or started; the
    /// consumer set is left unchanged.
    pub fn attach(&self, output: Arc<dyn OutputDevice>) -> Result<usize, ExchangeError> {
        if !output.is_open() {
            output.open()?;
        }
        output.start()?;

        let capacity = self.buffer.lock().len();
        let mut consumers = self.consumers.lock();
        consumers.entry(output.id()).or_insert_with(|| {
            tracing::debug!(input = %self.input.id(), output = %output.id(), "consumer attached");
            Arc::new(SampleProcessor::new(output.clone(), to_gain(1.0), capacity))
        });
        self.publish(&consumers);
        Ok(capacity)
    }

    /// Detaches an output device, flushing and stopping it.
    ///
    /// No-op if the device is not attached.
    pub fn detach(&self, output: &DeviceId) {
        let mut consumers = self.consumers.lock();
        if let Some(processor) = consumers.remove(output) {
            processor.output().flush();
            processor.output().stop();
            self.publish(&consumers);
            tracing::debug!(input = %self.input.id(), output = %output, "consumer detached");
        }
    }

    /// Sets the gain for an attached output from a linear control value.
    ///
    /// The value is mapped through [`to_gain`](crate::to_gain). No-op if the
    /// device is not attached.
    pub fn set_gain(&self, output: &DeviceId, linear: f64) {
        if let Some(processor) = self.consumers.lock().get(output) {
            processor.set_gain(to_gain(linear));
        }
    }

    /// Returns the linear control value for an attached output, or `None`
    /// if the device is not attached.
    pub fn gain(&self, output: &DeviceId) -> Option<f64> {
        self.consumers
            .lock()
            .get(output)
            .map(|processor| from_gain(processor.gain()))
    }

    /// Enables or disables the channel swap for an attached output.
    ///
    /// No-op if the device is not attached.
    pub fn set_swap(&self, output: &DeviceId, enabled: bool) {
        if let Some(processor) = self.consumers.lock().get(output) {
            processor.set_swap(enabled);
        }
    }

    /// Mutes or unmutes an attached output.
    ///
    /// No-op if the device is not attached.
    pub fn set_muted(&self, output: &DeviceId, muted: bool) {
        if let Some(processor) = self.consumers.lock().get(output) {
            processor.set_muted(muted);
        }
    }

    /// Opens and starts the input device and marks the route active.
    ///
    /// Idempotent: calling on an active route does nothing.
    ///
    /// # Errors
    ///
    /// `DeviceUnavailable` if the input cannot be opened or started; the
    /// route stays inactive.
    pub fn start(&self) -> Result<(), ExchangeError> {
        if self.active.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.input.is_open() {
            self.input.open()?;
        }
        self.input.start()?;
        self.active.store(true, Ordering::SeqCst);
        tracing::debug!(input = %self.input.id(), "route started");
        Ok(())
    }

    /// Stops the route: drains every consumer, clears the consumer set, and
    /// stops and closes the input device.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut consumers = self.consumers.lock();
        for processor in consumers.values() {
            processor.output().drain();
        }
        consumers.clear();
        self.publish(&consumers);
        if self.input.is_active() {
            self.input.stop();
        }
        self.input.close();
        tracing::debug!(input = %self.input.id(), "route stopped");
    }

    /// One exchange pass: read whatever the input has ready and fan it out.
    ///
    /// Called only from the exchange loop thread. An error (read or write)
    /// abandons the rest of this pass; the route is retried next iteration.
    pub(crate) fn pump(&self) -> Result<(), ExchangeError> {
        let mut buffer = self.buffer.lock();
        let available = self.input.available().min(buffer.len());
        let read = self.input.read(&mut buffer[..available])?;
        if read == 0 {
            return Ok(());
        }

        let consumers = self.snapshot.load_full();
        for processor in consumers.iter() {
            processor.process(&buffer[..read]);
            processor.write_out(read)?;
        }
        Ok(())
    }

    fn publish(&self, consumers: &HashMap<DeviceId, Arc<SampleProcessor>>) {
        self.snapshot
            .store(Arc::new(consumers.values().cloned().collect()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockInput, MockOutput};

    fn route_with_input() -> (Arc<MockInput>, AudioRoute) {
        let input = Arc::new(MockInput::new("mic", 44100, 64));
        let route = AudioRoute::new(input.clone());
        (input, route)
    }

    #[test]
    fn test_attach_is_idempotent() {
        let (_, route) = route_with_input();
        let output = Arc::new(MockOutput::new("speaker"));

        route.attach(output.clone()).unwrap();
        route.attach(output).unwrap();

        assert_eq!(route.consumer_count(), 1);
    }

    #[test]
    fn test_attach_returns_buffer_capacity() {
        let (_, route) = route_with_input();
        let output = Arc::new(MockOutput::new("speaker"));

        assert_eq!(route.attach(output.clone()).unwrap(), 64);
        assert!(output.is_open());
        assert!(output.is_started());
    }

    #[test]
    fn test_attach_failure_leaves_route_unchanged() {
        let (_, route) = route_with_input();
        let output = Arc::new(MockOutput::new("speaker"));
        output.set_fail_open(true);

        assert!(route.attach(output).is_err());
        assert_eq!(route.consumer_count(), 0);
        assert!(!route.has_consumers());
    }

    #[test]
    fn test_detach_flushes_and_stops() {
        let (_, route) = route_with_input();
        let output = Arc::new(MockOutput::new("speaker"));
        route.attach(output.clone()).unwrap();

        route.detach(&output.id());

        assert_eq!(route.consumer_count(), 0);
        assert_eq!(output.flush_count(), 1);
        assert!(!output.is_started());
    }

    #[test]
    fn test_detach_unknown_is_noop() {
        let (_, route) = route_with_input();
        route.detach(&DeviceId::new("never attached"));
        assert_eq!(route.consumer_count(), 0);
    }

    #[test]
    fn test_gain_roundtrips_through_curve() {
        let (_, route) = route_with_input();
        let output = Arc::new(MockOutput::new("speaker"));
        route.attach(output.clone()).unwrap();

        // Attach sets unity gain.
        let unity = route.gain(&output.id()).unwrap();
        assert!((unity - 1.0).abs() < 1e-9);

        route.set_gain(&output.id(), 1.3);
        assert!((route.gain(&output.id()).unwrap() - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_gain_of_unknown_output_is_none() {
        let (_, route) = route_with_input();
        assert!(route.gain(&DeviceId::new("ghost")).is_none());
        // And mutations on unknown outputs are silent no-ops.
        route.set_gain(&DeviceId::new("ghost"), 1.0);
        route.set_swap(&DeviceId::new("ghost"), true);
        route.set_muted(&DeviceId::new("ghost"), true);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (input, route) = route_with_input();
        route.start().unwrap();
        route.start().unwrap();
        assert!(route.is_active());
        assert!(input.is_active());
    }

    #[test]
    fn test_start_failure_keeps_route_inactive() {
        let (input, route) = route_with_input();
        input.set_fail_open(true);
        assert!(route.start().is_err());
        assert!(!route.is_active());
    }

    #[test]
    fn test_stop_drains_consumers_and_closes_input() {
        let (input, route) = route_with_input();
        let output = Arc::new(MockOutput::new("speaker"));
        route.attach(output.clone()).unwrap();
        route.start().unwrap();

        route.stop();

        assert!(!route.is_active());
        assert_eq!(route.consumer_count(), 0);
        assert_eq!(output.drain_count(), 1);
        assert!(!input.is_open());
    }

    #[test]
    fn test_pump_fans_out_to_all_consumers() {
        let (input, route) = route_with_input();
        let a = Arc::new(MockOutput::new("a"));
        let b = Arc::new(MockOutput::new("b"));
        route.attach(a.clone()).unwrap();
        route.attach(b.clone()).unwrap();
        route.start().unwrap();

        input.push_samples(&[10, 20, 30]);
        route.pump().unwrap();

        let expected: Vec<u8> = [10i16, 20, 30]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(a.writes(), vec![expected.clone()]);
        assert_eq!(b.writes(), vec![expected]);
    }

    #[test]
    fn test_pump_with_nothing_available_writes_nothing() {
        let (_, route) = route_with_input();
        let output = Arc::new(MockOutput::new("speaker"));
        route.attach(output.clone()).unwrap();
        route.start().unwrap();

        route.pump().unwrap();
        assert_eq!(output.write_count(), 0);
    }

    #[test]
    fn test_pump_propagates_read_failure() {
        let (input, route) = route_with_input();
        let output = Arc::new(MockOutput::new("speaker"));
        route.attach(output.clone()).unwrap();
        route.start().unwrap();

        input.push_samples(&[1]);
        input.set_fail_reads(true);
        assert!(route.pump().is_err());
        assert_eq!(output.write_count(), 0);
    }
}
