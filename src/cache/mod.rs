//! Two-tier response cache for the app shell.
//!
//! This module provides:
//! - A static partition, filled once at install time with shell assets
//! - A dynamic partition for runtime responses, bounded by entry count
//! - FIFO eviction (oldest insertion first) run as tracked background tasks
//! - Cleanup of partitions left behind by older versions

mod layer;
mod storage;
mod traits;

pub use layer::{CacheLayer, PartitionNames};
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CachedResponse, RequestKey};
