use chrono::{DateTime, Months, Utc};

/// Maps an entity id and a creation time onto a physical partition name, so
/// records can be located without a secondary index.
///
/// The partition is `{base}_{YYYYMM}_{shard}` where `shard` is the CRC-32 of
/// the entity id modulo the configured shard count.
#[derive(Debug, Clone, Copy)]
pub struct TableRouter {
    shard_count: u32,
}

impl TableRouter {
    pub fn new(shard_count: u32) -> Self {
        Self {
            shard_count: shard_count.max(1),
        }
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn shard_of(&self, entity_id: &str) -> u32 {
        crc32fast::hash(entity_id.as_bytes()) % self.shard_count
    }

    /// `timestamp` is in unix seconds; zero, negative or out-of-range values
    /// resolve to the current month.
    pub fn route(&self, base: &str, entity_id: &str, timestamp: i64) -> String {
        self.route_at(base, entity_id, month_of(timestamp))
    }

    /// Partitions for the month of `timestamp` and the `months_back` months
    /// before it, newest first.
    pub fn route_recent(
        &self,
        base: &str,
        entity_id: &str,
        timestamp: i64,
        months_back: u32,
    ) -> Vec<String> {
        let anchor = month_of(timestamp);
        (0..=months_back)
            .filter_map(|n| anchor.checked_sub_months(Months::new(n)))
            .map(|at| self.route_at(base, entity_id, at))
            .collect()
    }

    fn route_at(&self, base: &str, entity_id: &str, at: DateTime<Utc>) -> String {
        format!("{}_{}_{}", base, at.format("%Y%m"), self.shard_of(entity_id))
    }
}

fn month_of(timestamp: i64) -> DateTime<Utc> {
    if timestamp <= 0 {
        return Utc::now();
    }
    DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now)
}
