use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::strategy::CompressionStrategy;

/// Running counters for one compression strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Successful compressions.
    pub total_compressions: u64,
    /// Sum of encoded (pre-compression) sizes in bytes.
    pub total_original_size: u64,
    /// Sum of compressed sizes in bytes.
    pub total_compressed_size: u64,
    /// Ratio `original / compressed` of the most recent compression.
    pub last_ratio: f64,
}

impl CompressionStats {
    fn record(&mut self, original_size: usize, compressed_size: usize) {
        let original = u64::try_from(original_size).unwrap_or(u64::MAX);
        let compressed = u64::try_from(compressed_size).unwrap_or(u64::MAX);
        self.total_compressions = self.total_compressions.saturating_add(1);
        self.total_original_size = self.total_original_size.saturating_add(original);
        self.total_compressed_size = self.total_compressed_size.saturating_add(compressed);
        self.last_ratio = compression_ratio(original, compressed);
    }

    /// Ratio over all compressions so far.
    #[must_use]
    pub fn average_ratio(&self) -> f64 {
        compression_ratio(self.total_original_size, self.total_compressed_size)
    }
}

/// `original / compressed`, or 0 when nothing was produced.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if compressed == 0 {
        0.0
    } else {
        original as f64 / compressed as f64
    }
}

/// Per-strategy statistics behind a single lock.
#[derive(Debug, Default)]
pub struct CompressionStatsTracker {
    stats: Mutex<IndexMap<CompressionStrategy, CompressionStats>>,
}

impl CompressionStatsTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one successful compression into the counters and returns them.
    pub fn record(
        &self,
        strategy: CompressionStrategy,
        original_size: usize,
        compressed_size: usize,
    ) -> CompressionStats {
        let mut stats = self.stats.lock();
        let entry = stats.entry(strategy).or_default();
        entry.record(original_size, compressed_size);
        *entry
    }

    /// Copy of all counters, in first-use order.
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<CompressionStrategy, CompressionStats> {
        self.stats.lock().clone()
    }

    /// Counters for one strategy, if it has been used.
    #[must_use]
    pub fn get(&self, strategy: CompressionStrategy) -> Option<CompressionStats> {
        self.stats.lock().get(&strategy).copied()
    }
}
