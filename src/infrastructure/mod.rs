//! Adapters for the domain ports: in-memory stores, optional RocksDB order
//! storage and Redis shared cache, a scripted upstream, and log-based
//! telemetry sinks.

pub mod in_memory;
#[cfg(feature = "cache-redis")]
pub mod redis;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod simulated_upstream;
pub mod telemetry;
