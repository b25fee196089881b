//! Bounded history of recent outputs plus per-topic statistics.

use std::collections::{BTreeMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;

use flowwatch_types::{OutputRecord, TopicStatistics};

/// Default number of records retained.
pub const DEFAULT_CAPACITY: usize = 500;

/// Fixed-capacity FIFO of output records.
///
/// Inserting past capacity evicts the oldest record. Statistics and the
/// total counter are kept separately and are never reduced by eviction.
#[derive(Debug, Clone)]
pub struct OutputCache {
    capacity: usize,
    records: VecDeque<Arc<OutputRecord>>,
    statistics: BTreeMap<String, TopicStatistics>,
    total: u64,
    last_received_ms: u64,
}

impl OutputCache {
    /// Create an empty cache holding at most `capacity` records.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity: capacity.get(),
            records: VecDeque::with_capacity(capacity.get()),
            statistics: BTreeMap::new(),
            total: 0,
            last_received_ms: 0,
        }
    }

    /// Store a record, evicting the oldest if the cache is full.
    ///
    /// Assigns the record's `sequence` and clamps `received_at_ms` so arrival
    /// times never go backwards. Returns the stored record.
    pub fn record(&mut self, mut record: OutputRecord) -> Arc<OutputRecord> {
        record.sequence = self.total;
        record.received_at_ms = record.received_at_ms.max(self.last_received_ms);
        self.last_received_ms = record.received_at_ms;
        self.total += 1;

        self.statistics
            .entry(record.topic.clone())
            .or_insert_with(|| TopicStatistics::new(record.topic.clone()))
            .observe(record.received_at_ms);

        let record = Arc::new(record);
        self.records.push_back(record.clone());
        if self.records.len() > self.capacity {
            self.records.pop_front();
        }
        record
    }

    /// Up to `n` most recent records, newest first.
    pub fn latest(&self, n: usize) -> Vec<Arc<OutputRecord>> {
        self.records.iter().rev().take(n).cloned().collect()
    }

    /// Every retained record, oldest first.
    pub fn all(&self) -> Vec<Arc<OutputRecord>> {
        self.records.iter().cloned().collect()
    }

    /// Snapshot of the statistics table.
    pub fn statistics_by_topic(&self) -> BTreeMap<String, TopicStatistics> {
        self.statistics.clone()
    }

    /// Records ever inserted.
    pub fn total_recorded(&self) -> u64 {
        self.total
    }

    /// Records currently retained.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no records are retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of retained records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for OutputCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}
