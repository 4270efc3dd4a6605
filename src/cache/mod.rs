//! Versioned response storage for offline support.
//!
//! This module provides the storage side of the gateway:
//! - Named buckets of request key -> response, replaced wholesale per key
//! - Versioned bucket naming per role, with stale-bucket purging
//! - A bucket handle that degrades storage failures to misses and dropped writes

mod bucket;
mod namespace;
mod storage;

pub use bucket::Bucket;
pub use namespace::{is_name_segment, NamespaceManager, Role};
pub use storage::{BucketStorage, NoopStorage, SqliteStorage};
