//! Progress event surface: registration lists invoked from worker threads
//! plus the delayed accumulator that coalesces high-frequency increments.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// A list of callbacks fired together. Handlers run on worker threads and
/// must be thread-safe; registration takes the write lock, so it must not
/// happen while a render is in flight.
pub struct EventHandler<T> {
    callbacks: RwLock<Vec<Arc<dyn Fn(T) + Send + Sync>>>,
}

impl<T> Default for EventHandler<T> {
    fn default() -> Self {
        Self { callbacks: RwLock::new(Vec::new()) }
    }
}

impl<T: Copy> EventHandler<T> {
    pub fn add(&self, callback: impl Fn(T) + Send + Sync + 'static) {
        self.callbacks.write().unwrap().push(Arc::new(callback));
    }

    pub fn call(&self, value: T) {
        for callback in self.callbacks.read().unwrap().iter() {
            callback(value);
        }
    }
}

/// Events exposed to embedders (progress bars, GUIs).
#[derive(Default)]
pub struct ProgressEvents {
    pub total_chunks: EventHandler<u64>,
    pub finished_chunks: EventHandler<u64>,
    pub total_render: EventHandler<u64>,
    pub finished_render: EventHandler<u64>,
    pub done: EventHandler<()>,
}

/// Flush cadence for the accumulators.
pub const PROGRESS_DELAY: Duration = Duration::from_millis(50);

struct Accumulated {
    sum: u64,
    last_flush: Instant,
    dirty: bool,
}

/// Sums increments and forwards them at a fixed cadence, with an explicit
/// flush at stream end.
pub struct DelayedAccumulator {
    state: Mutex<Accumulated>,
    delay: Duration,
    sink: Box<dyn Fn(u64) + Send + Sync>,
}

impl DelayedAccumulator {
    pub fn new(delay: Duration, sink: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(Accumulated { sum: 0, last_flush: Instant::now(), dirty: false }),
            delay,
            sink: Box::new(sink),
        }
    }

    pub fn add(&self, n: u64) {
        let mut state = self.state.lock().unwrap();
        state.sum += n;
        if state.last_flush.elapsed() >= self.delay {
            self.send(&mut state);
        } else {
            state.dirty = true;
        }
    }

    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        if state.dirty {
            self.send(&mut state);
        }
    }

    fn send(&self, state: &mut Accumulated) {
        (self.sink)(state.sum);
        state.sum = 0;
        state.last_flush = Instant::now();
        state.dirty = false;
    }
}

impl Drop for DelayedAccumulator {
    fn drop(&mut self) {
        self.flush();
    }
}
