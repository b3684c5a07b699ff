//! Mock devices for testing without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{DeviceId, InputDevice, OutputDevice};
use crate::ExchangeError;

/// A mock capture device backed by an in-memory byte queue.
///
/// Bytes pushed with [`push_samples`](MockInput::push_samples) or
/// [`push_bytes`](MockInput::push_bytes) become readable through the
/// [`InputDevice`] interface, which makes the full engine testable in CI.
/// Failures can be injected to exercise the loop's error isolation.
///
/// # Example
///
/// ```
/// use audio_exchange::device::MockInput;
/// use audio_exchange::InputDevice;
///
/// let mock = MockInput::new("mic", 44100, 4096);
/// mock.push_samples(&[100, -200]);
/// assert_eq!(mock.available(), 4);
/// ```
pub struct MockInput {
    id: DeviceId,
    sample_rate: u32,
    capacity: usize,
    queue: Mutex<VecDeque<u8>>,
    open: AtomicBool,
    active: AtomicBool,
    fail_open: AtomicBool,
    fail_reads: AtomicBool,
}

impl MockInput {
    /// Creates a mock input with the given identity, rate, and capacity.
    pub fn new(id: &str, sample_rate: u32, capacity: usize) -> Self {
        Self {
            id: DeviceId::new(id),
            sample_rate,
            capacity,
            queue: Mutex::new(VecDeque::new()),
            open: AtomicBool::new(false),
            active: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Queues raw bytes for capture.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.queue.lock().extend(bytes.iter().copied());
    }

    /// Queues 16-bit samples for capture, little-endian encoded.
    pub fn push_samples(&self, samples: &[i16]) {
        let mut queue = self.queue.lock();
        for &sample in samples {
            queue.extend(sample.to_le_bytes());
        }
    }

    /// Makes subsequent `open()` calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `read()` calls fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

impl InputDevice for MockInput {
    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    fn open(&self) -> Result<(), ExchangeError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ExchangeError::unavailable(
                self.id.as_str(),
                "injected open failure",
            ));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self) -> Result<(), ExchangeError> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn available(&self) -> usize {
        self.queue.lock().len()
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, ExchangeError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ExchangeError::io(
                self.id.as_str(),
                "injected read failure",
            ));
        }
        let mut queue = self.queue.lock();
        let count = buf.len().min(queue.len());
        for slot in buf[..count].iter_mut() {
            if let Some(byte) = queue.pop_front() {
                *slot = byte;
            }
        }
        Ok(count)
    }

    fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// A mock playback device that records every write.
///
/// Written buffers are captured verbatim for assertions; flush and drain
/// calls are counted. Open and write failures can be injected.
pub struct MockOutput {
    id: DeviceId,
    writes: Mutex<Vec<Vec<u8>>>,
    open: AtomicBool,
    active: AtomicBool,
    fail_open: AtomicBool,
    fail_writes: AtomicBool,
    flushes: AtomicUsize,
    drains: AtomicUsize,
}

impl MockOutput {
    /// Creates a mock output with the given identity.
    pub fn new(id: &str) -> Self {
        Self {
            id: DeviceId::new(id),
            writes: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
            active: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            flushes: AtomicUsize::new(0),
            drains: AtomicUsize::new(0),
        }
    }

    /// Makes subsequent `open()` calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `write()` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns every buffer written so far.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Returns the number of write calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// Returns `true` if playback has been started and not stopped.
    pub fn is_started(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the number of flush calls so far.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Returns the number of drain calls so far.
    pub fn drain_count(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }
}

impl OutputDevice for MockOutput {
    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    fn open(&self) -> Result<(), ExchangeError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ExchangeError::unavailable(
                self.id.as_str(),
                "injected open failure",
            ));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self) -> Result<(), ExchangeError> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn drain(&self) {
        self.drains.fetch_add(1, Ordering::SeqCst);
    }

    fn write(&self, buf: &[u8]) -> Result<(), ExchangeError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ExchangeError::io(
                self.id.as_str(),
                "injected write failure",
            ));
        }
        self.writes.lock().push(buf.to_vec());
        Ok(())
    }
}
