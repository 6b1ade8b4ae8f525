//! Priority thread pool.
//!
//! A fixed set of workers drains a max-heap of tasks keyed on a signed
//! priority (higher runs earlier). Workers pop batches of up to
//! `ceil(queue / workers)` tasks to amortise locking. Task batches can be
//! built off-pool in a [`Transaction`] and committed in one lock. There is
//! no mid-task cancellation; [`ThreadPool::abort`] only drains the queue,
//! cooperative run flags handle the rest.

use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type TaskFn = Box<dyn FnOnce() + Send>;

struct PrioTask {
    priority: i32,
    seq: u64,
    task: TaskFn,
}

impl PartialEq for PrioTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PrioTask {}

impl PartialOrd for PrioTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first; earlier submission wins ties.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum SlotState<T> {
    Pending,
    Done(T),
    /// The task was dropped unexecuted (aborted queue).
    Gone,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

/// Receives a task's result. Waiting on a task dropped by `abort` yields
/// `None`.
pub struct TaskHandle<T> {
    slot: Arc<Slot<T>>,
}

impl<T> TaskHandle<T> {
    /// A handle that is already resolved.
    pub fn ready(value: T) -> Self {
        Self {
            slot: Arc::new(Slot {
                state: Mutex::new(SlotState::Done(value)),
                ready: Condvar::new(),
            }),
        }
    }

    /// Block until the task ran or was discarded.
    pub fn wait(self) -> Option<T> {
        let mut state = self.slot.state.lock().unwrap();
        loop {
            match &*state {
                SlotState::Pending => state = self.slot.ready.wait(state).unwrap(),
                SlotState::Gone => return None,
                SlotState::Done(_) => {
                    let done = std::mem::replace(&mut *state, SlotState::Gone);
                    let SlotState::Done(value) = done else { unreachable!() };
                    return Some(value);
                }
            }
        }
    }
}

/// Wrap a closure so its handle resolves to `Gone` if the boxed task is
/// dropped before running.
fn package<T: Send + 'static>(
    f: impl FnOnce() -> T + Send + 'static,
) -> (TaskFn, TaskHandle<T>) {
    struct Completion<T> {
        slot: Arc<Slot<T>>,
        armed: bool,
    }

    impl<T> Drop for Completion<T> {
        fn drop(&mut self) {
            if self.armed {
                *self.slot.state.lock().unwrap() = SlotState::Gone;
                self.slot.ready.notify_all();
            }
        }
    }

    let slot = Arc::new(Slot { state: Mutex::new(SlotState::Pending), ready: Condvar::new() });
    let handle = TaskHandle { slot: Arc::clone(&slot) };
    let mut completion = Completion { slot, armed: true };
    let task = Box::new(move || {
        let value = f();
        completion.armed = false;
        *completion.slot.state.lock().unwrap() = SlotState::Done(value);
        completion.slot.ready.notify_all();
    });
    (task, handle)
}

/// Private task batch, committed atomically.
#[derive(Default)]
pub struct Transaction {
    tasks: BinaryHeap<PrioTask>,
    seq: u64,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn enqueue<T: Send + 'static>(
        &mut self,
        priority: i32,
        f: impl FnOnce() -> T + Send + 'static,
    ) -> TaskHandle<T> {
        let (task, handle) = package(f);
        self.seq += 1;
        self.tasks.push(PrioTask { priority, seq: self.seq, task });
        handle
    }
}

struct State {
    queue: BinaryHeap<PrioTask>,
    running: usize,
    finish: bool,
    seq: u64,
}

struct Inner {
    state: Mutex<State>,
    work: Condvar,
    idle: Condvar,
}

pub struct ThreadPool {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                queue: BinaryHeap::new(),
                running: 0,
                finish: false,
                seq: u64::MAX / 2,
            }),
            work: Condvar::new(),
            idle: Condvar::new(),
        });
        let workers = (0..size)
            .map(|_| {
                let inner = Arc::clone(&inner);
                std::thread::spawn(move || worker_loop(&inner, size))
            })
            .collect();
        Self { inner, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn enqueue<T: Send + 'static>(
        &self,
        priority: i32,
        f: impl FnOnce() -> T + Send + 'static,
    ) -> TaskHandle<T> {
        let (task, handle) = package(f);
        {
            let mut state = self.inner.state.lock().unwrap();
            state.seq += 1;
            let seq = state.seq;
            state.queue.push(PrioTask { priority, seq, task });
        }
        self.inner.work.notify_one();
        handle
    }

    /// Merge a transaction into the queue under a single lock.
    pub fn commit(&self, transaction: &mut Transaction) {
        if transaction.is_empty() {
            return;
        }
        let mut incoming = std::mem::take(&mut transaction.tasks);
        transaction.seq = 0;
        {
            let mut state = self.inner.state.lock().unwrap();
            // `append` moves the smaller heap into the larger one.
            state.queue.append(&mut incoming);
        }
        self.inner.work.notify_all();
    }

    pub fn idle(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.running == 0 && state.queue.is_empty()
    }

    /// Block until the queue is empty and no worker is mid-task.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock().unwrap();
        while state.running != 0 || !state.queue.is_empty() {
            state = self.inner.idle.wait(state).unwrap();
        }
    }

    /// Drop every queued task. Their handles resolve to `None`. Running
    /// tasks are unaffected.
    pub fn abort(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.queue.clear();
        }
        self.inner.work.notify_all();
        self.inner.idle.notify_all();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.finish = true;
        }
        self.inner.work.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(inner: &Inner, size: usize) {
    let mut state = inner.state.lock().unwrap();
    loop {
        if !state.queue.is_empty() {
            // Leave enough tasks for the other workers.
            let max_pop = state.queue.len().div_ceil(size);
            let mut batch = Vec::with_capacity(max_pop);
            for _ in 0..max_pop {
                match state.queue.pop() {
                    Some(task) => batch.push(task.task),
                    None => break,
                }
            }
            state.running += 1;
            drop(state);

            for task in batch {
                task();
            }

            state = inner.state.lock().unwrap();
            state.running -= 1;
            inner.idle.notify_all();
        } else if state.finish {
            break;
        } else {
            state = inner.work.wait(state).unwrap();
        }
    }
}
