//! Counting permit pool bounding concurrent directory listings

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counting semaphore with a high-water mark of permits held at once
#[derive(Debug)]
pub struct PermitPool {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl PermitPool {
    /// Create a pool; a capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Block until a permit is free
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.released.wait(&mut available);
        }
        *available -= 1;
        drop(available);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Permit { pool: self }
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        drop(available);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Some(Permit { pool: self })
    }

    fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut available = self.available.lock();
        *available += 1;
        drop(available);
        self.released.notify_one();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits ever held at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// RAII permit, returned to the pool on drop
#[derive(Debug)]
pub struct Permit<'a> {
    pool: &'a PermitPool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_try_acquire_respects_capacity() {
        let pool = PermitPool::new(2);
        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.in_flight(), 2);

        drop(a);
        assert_eq!(pool.in_flight(), 1);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let pool = PermitPool::new(0);
        assert_eq!(pool.capacity(), 1);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn test_peak_never_exceeds_capacity_under_contention() {
        let pool = Arc::new(PermitPool::new(3));
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..5 {
                        let _permit = pool.acquire();
                        thread::sleep(Duration::from_millis(1));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(pool.peak_in_flight() <= 3);
        assert!(pool.peak_in_flight() >= 1);
        assert_eq!(pool.in_flight(), 0);
    }
}
