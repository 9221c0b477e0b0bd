//! Memory Accounting
//!
//! Budget, statistics and reporting types for texture memory:
//! - Budget checks
//! - Lock-free allocation statistics with peak tracking
//! - Point-in-time usage reports for diagnostics

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::MEGABYTE;

/// Memory budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    /// Maximum bytes allowed
    pub max_bytes: usize,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::from_megabytes(100)
    }
}

impl MemoryBudget {
    /// Create a budget from a byte count
    pub const fn from_bytes(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Create a budget from a megabyte count
    pub const fn from_megabytes(megabytes: u32) -> Self {
        Self::from_bytes(megabytes as usize * MEGABYTE)
    }

    /// True when `used` is strictly above the budget
    pub fn is_exceeded(&self, used: usize) -> bool {
        used > self.max_bytes
    }
}

/// Memory tracking statistics
#[derive(Debug, Default)]
pub struct MemoryStats {
    /// Total bytes allocated
    pub allocated: AtomicUsize,
    /// Peak bytes allocated
    pub peak: AtomicUsize,
    /// Number of allocations
    pub allocation_count: AtomicUsize,
}

impl MemoryStats {
    /// Create new memory stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an allocation
    pub fn record_alloc(&self, size: usize) {
        let new_size = self.allocated.fetch_add(size, Ordering::Relaxed) + size;
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        self.peak.fetch_max(new_size, Ordering::Relaxed);
    }

    /// Record a deallocation
    pub fn record_dealloc(&self, size: usize) {
        let _ = self
            .allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(size))
            });
    }

    /// Get current allocated bytes
    pub fn current(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Get peak allocated bytes
    pub fn peak_usage(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Get total allocation count
    pub fn count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }
}

/// Snapshot of texture memory usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryReport {
    /// Bytes held by cache-managed textures (RAM or VRAM)
    pub committed: usize,
    /// Estimated bytes of textures waiting in or running on the loader
    pub queued: usize,
    /// Bytes held by textures that manage their own storage
    pub unmanaged: usize,
    /// Estimated bytes if every registered texture were resident
    pub total_estimated: usize,
    /// Configured budget in bytes
    pub budget: usize,
}

impl MemoryReport {
    /// Committed, queued and unmanaged usage combined
    pub fn total_usage(&self) -> usize {
        self.committed + self.queued + self.unmanaged
    }

    /// True when the combined usage is above the budget
    pub fn is_over_budget(&self) -> bool {
        self.total_usage() > self.budget
    }
}

fn megabytes(bytes: usize) -> f64 {
    bytes as f64 / MEGABYTE as f64
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "committed {:.2} MB, queued {:.2} MB, unmanaged {:.2} MB, total {:.2} / {:.2} MB (estimated {:.2} MB)",
            megabytes(self.committed),
            megabytes(self.queued),
            megabytes(self.unmanaged),
            megabytes(self.total_usage()),
            megabytes(self.budget),
            megabytes(self.total_estimated),
        )
    }
}
