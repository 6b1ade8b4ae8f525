//! File-descriptor gate.
//!
//! Region, chunk and table files are opened from many pool workers at once;
//! the gate caps how many are open simultaneously. It is passed explicitly
//! into every container open instead of living in a global.

use std::sync::{Arc, Condvar, Mutex};

/// Capacity headroom kept free for logs, the output image and stdio.
const RESERVE: usize = 16;
const SOFT_LIMIT: usize = 512;

#[derive(Clone)]
pub struct FdGate {
    inner: Arc<Inner>,
}

struct Inner {
    available: Mutex<usize>,
    freed: Condvar,
    capacity: usize,
}

/// Held while a file is open; releases the slot on drop.
pub struct FdPermit {
    inner: Arc<Inner>,
}

impl FdGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                available: Mutex::new(capacity),
                freed: Condvar::new(),
                capacity,
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(SOFT_LIMIT - RESERVE)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Blocks until a descriptor slot is free.
    pub fn acquire(&self) -> FdPermit {
        let mut available = self.inner.available.lock().unwrap();
        while *available == 0 {
            available = self.inner.freed.wait(available).unwrap();
        }
        *available -= 1;
        FdPermit { inner: Arc::clone(&self.inner) }
    }
}

impl Drop for FdPermit {
    fn drop(&mut self) {
        let mut available = self.inner.available.lock().unwrap();
        *available += 1;
        self.inner.freed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release() {
        let gate = FdGate::new(2);
        let a = gate.acquire();
        let b = gate.acquire();
        drop(a);
        let _c = gate.acquire();
        drop(b);
    }

    #[test]
    fn blocks_at_capacity() {
        let gate = FdGate::new(1);
        let permit = gate.acquire();
        let gate2 = gate.clone();
        let handle = std::thread::spawn(move || {
            let _p = gate2.acquire();
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!handle.is_finished());
        drop(permit);
        handle.join().unwrap();
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let gate = FdGate::new(0);
        assert_eq!(gate.capacity(), 1);
        let _p = gate.acquire();
    }
}
