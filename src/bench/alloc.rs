//! Allocation accounting
//!
//! `CountingAllocator` wraps the system allocator and keeps process-wide
//! counters. The binary installs it with `#[global_allocator]`; without it
//! the counters stay at zero and allocation columns read zero.
//!
//! There is no garbage collector to drain before a trial. The quiescence
//! barrier takes two counter snapshots around a thread yield so pending
//! frees from the previous trial are settled in the baseline. Baseline
//! allocator state can still differ between runs.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use tracing::trace;

static INSTALLED: AtomicBool = AtomicBool::new(false);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);
static FREED_BYTES: AtomicU64 = AtomicU64::new(0);

/// Global allocator that counts allocations and bytes
pub struct CountingAllocator;

impl CountingAllocator {
    #[inline]
    fn record_alloc(size: usize) {
        INSTALLED.store(true, Ordering::Relaxed);
        ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        ALLOCATED_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_free(size: usize) {
        FREED_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Whether this allocator has served at least one allocation
    pub fn is_installed() -> bool {
        INSTALLED.load(Ordering::Relaxed)
    }
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            Self::record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            Self::record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        Self::record_free(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            Self::record_free(layout.size());
            Self::record_alloc(new_size);
        }
        new_ptr
    }
}

/// Point-in-time copy of the allocator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocSnapshot {
    pub allocations: u64,
    pub allocated_bytes: u64,
    pub freed_bytes: u64,
}

impl AllocSnapshot {
    pub fn now() -> Self {
        Self {
            allocations: ALLOCATIONS.load(Ordering::Relaxed),
            allocated_bytes: ALLOCATED_BYTES.load(Ordering::Relaxed),
            freed_bytes: FREED_BYTES.load(Ordering::Relaxed),
        }
    }

    /// Bytes currently held
    pub fn live_bytes(&self) -> i64 {
        self.allocated_bytes as i64 - self.freed_bytes as i64
    }

    /// Counter movement from `earlier` to `self`
    pub fn since(&self, earlier: &AllocSnapshot) -> AllocDelta {
        AllocDelta {
            allocations: self.allocations.saturating_sub(earlier.allocations),
            allocated_bytes: self.allocated_bytes.saturating_sub(earlier.allocated_bytes),
            retained_bytes: self.live_bytes() - earlier.live_bytes(),
        }
    }
}

/// Allocation activity over an interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocDelta {
    pub allocations: u64,
    pub allocated_bytes: u64,
    /// Net bytes still held at the end of the interval
    pub retained_bytes: i64,
}

/// Pre-trial isolation barrier. Returns the settled baseline.
pub fn quiesce() -> AllocSnapshot {
    let first = AllocSnapshot::now();
    std::thread::yield_now();
    let settled = AllocSnapshot::now();

    trace!(
        "Allocator settled: {} live bytes ({} freed during barrier)",
        settled.live_bytes(),
        settled.freed_bytes - first.freed_bytes
    );
    settled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_between_snapshots() {
        let earlier = AllocSnapshot {
            allocations: 10,
            allocated_bytes: 1_000,
            freed_bytes: 400,
        };
        let later = AllocSnapshot {
            allocations: 14,
            allocated_bytes: 3_048,
            freed_bytes: 2_400,
        };

        let delta = later.since(&earlier);
        assert_eq!(delta.allocations, 4);
        assert_eq!(delta.allocated_bytes, 2_048);
        assert_eq!(delta.retained_bytes, 48);
    }

    #[test]
    fn test_counters_never_go_backwards() {
        let before = quiesce();
        let buffer = vec![0u8; 4096];
        std::hint::black_box(&buffer);
        let after = AllocSnapshot::now();

        assert!(after.allocations >= before.allocations);
        assert!(after.allocated_bytes >= before.allocated_bytes);
    }
}
