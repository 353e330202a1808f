//! GC statistics.
//!
//! Tracks allocation volume, collection counts and pause times, and the
//! live-object high-water mark, for test harnesses to assert against.
//! Counters start at zero when the heap is built, accumulate for its whole
//! lifetime and are never persisted.

use crate::collector::CollectionResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Statistics about allocation and collection activity.
#[derive(Debug)]
pub struct GcStats {
    // =========================================================================
    // Allocation Statistics
    // =========================================================================
    /// Total objects allocated.
    pub allocations: AtomicU64,
    /// Total bytes allocated, headers included.
    pub bytes_allocated: AtomicU64,
    /// Objects currently live (exact after a collection, an upper bound
    /// between collections).
    pub live_objects: AtomicU64,
    /// Highest value `live_objects` has reached.
    pub live_high_water: AtomicU64,

    // =========================================================================
    // Collection Statistics
    // =========================================================================
    /// Collections run.
    pub collections: AtomicU64,
    /// Objects reclaimed by all collections.
    pub objects_reclaimed: AtomicU64,
    /// Bytes reclaimed by all collections.
    pub bytes_reclaimed: AtomicU64,
    /// Objects relocated by the copying collector.
    pub objects_relocated: AtomicU64,
    /// Total time spent collecting (nanoseconds).
    pub gc_time_ns: AtomicU64,
    /// Longest single pause (nanoseconds).
    pub max_pause_ns: AtomicU64,
}

impl GcStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            bytes_allocated: AtomicU64::new(0),
            live_objects: AtomicU64::new(0),
            live_high_water: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            objects_reclaimed: AtomicU64::new(0),
            bytes_reclaimed: AtomicU64::new(0),
            objects_relocated: AtomicU64::new(0),
            gc_time_ns: AtomicU64::new(0),
            max_pause_ns: AtomicU64::new(0),
        }
    }

    /// Record an allocation of `size` bytes.
    #[inline]
    pub fn record_allocation(&self, size: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated
            .fetch_add(size as u64, Ordering::Relaxed);
        let live = self.live_objects.fetch_add(1, Ordering::Relaxed) + 1;
        self.live_high_water.fetch_max(live, Ordering::Relaxed);
    }

    /// Record a finished collection.
    pub fn record_collection(&self, result: &CollectionResult, pause: Duration) {
        let pause_ns = pause.as_nanos() as u64;
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.objects_reclaimed
            .fetch_add(result.objects_reclaimed as u64, Ordering::Relaxed);
        self.bytes_reclaimed
            .fetch_add(result.bytes_reclaimed as u64, Ordering::Relaxed);
        self.objects_relocated
            .fetch_add(result.objects_relocated as u64, Ordering::Relaxed);
        self.gc_time_ns.fetch_add(pause_ns, Ordering::Relaxed);
        self.max_pause_ns.fetch_max(pause_ns, Ordering::Relaxed);
        self.live_objects
            .store(result.objects_live as u64, Ordering::Relaxed);
    }

    /// Get total GC time.
    pub fn total_gc_time(&self) -> Duration {
        Duration::from_nanos(self.gc_time_ns.load(Ordering::Relaxed))
    }

    /// Get average pause time.
    pub fn avg_pause(&self) -> Duration {
        let count = self.collections.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.gc_time_ns.load(Ordering::Relaxed) / count)
    }

    /// Copy the counters into a plain value.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
            live_objects: self.live_objects.load(Ordering::Relaxed),
            live_high_water: self.live_high_water.load(Ordering::Relaxed),
            collections: self.collections.load(Ordering::Relaxed),
            objects_reclaimed: self.objects_reclaimed.load(Ordering::Relaxed),
            bytes_reclaimed: self.bytes_reclaimed.load(Ordering::Relaxed),
            objects_relocated: self.objects_relocated.load(Ordering::Relaxed),
            total_gc_time: self.total_gc_time(),
            max_pause: Duration::from_nanos(self.max_pause_ns.load(Ordering::Relaxed)),
        }
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`GcStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total objects allocated.
    pub allocations: u64,
    /// Total bytes allocated, headers included.
    pub bytes_allocated: u64,
    /// Objects currently live.
    pub live_objects: u64,
    /// Live-object high-water mark.
    pub live_high_water: u64,
    /// Collections run.
    pub collections: u64,
    /// Objects reclaimed.
    pub objects_reclaimed: u64,
    /// Bytes reclaimed.
    pub bytes_reclaimed: u64,
    /// Objects relocated.
    pub objects_relocated: u64,
    /// Total time spent collecting.
    pub total_gc_time: Duration,
    /// Longest single pause.
    pub max_pause: Duration,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== GC Statistics ===")?;
        writeln!(
            f,
            "Allocations: {} objects, {}",
            self.allocations,
            format_bytes(self.bytes_allocated)
        )?;
        writeln!(
            f,
            "Live: {} objects (high water {})",
            self.live_objects, self.live_high_water
        )?;
        writeln!(
            f,
            "Collections: {} ({} reclaimed, {} relocated, {} freed)",
            self.collections,
            self.objects_reclaimed,
            self.objects_relocated,
            format_bytes(self.bytes_reclaimed)
        )?;
        write!(
            f,
            "GC Time: {:?} total, {:?} max pause",
            self.total_gc_time, self.max_pause
        )
    }
}

/// Format bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Timer for measuring collection pauses.
pub struct GcTimer {
    start: Instant,
    label: &'static str,
}

impl GcTimer {
    /// Start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    /// Stop the timer and return the elapsed duration.
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::trace!(phase = self.label, ?elapsed, "gc phase finished");
        elapsed
    }
}
