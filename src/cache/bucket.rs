//! Handle on a single bucket, used as the static asset cache and the API
//! response cache.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::BucketStorage;
use crate::http::{Request, Response};

/// Cache bucket that never lets storage failures escape on the serving path:
/// failed reads are misses, failed writes are dropped.
pub struct Bucket<S: BucketStorage> {
  storage: Arc<S>,
  name: String,
}

impl<S: BucketStorage> Bucket<S> {
  pub fn new(storage: Arc<S>, name: impl Into<String>) -> Self {
    Self {
      storage,
      name: name.into(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Create the bucket if needed.
  pub fn open(&self) -> Result<()> {
    self.storage.open_bucket(&self.name)
  }

  /// Find the stored response for `request`. Only GET requests can match.
  pub fn lookup(&self, request: &Request) -> Option<Response> {
    if !request.is_get() {
      return None;
    }

    match self.storage.get_entry(&self.name, &request.cache_key()) {
      Ok(found) => found,
      Err(e) => {
        warn!(bucket = %self.name, url = %request.url, error = %e, "Cache read failed, treating as miss");
        None
      }
    }
  }

  /// Store a copy of `response` for `request`; the caller keeps the original.
  ///
  /// Returns whether the entry was written.
  pub fn store(&self, request: &Request, response: &Response) -> bool {
    if !request.is_get() {
      debug!(method = %request.method, url = %request.url, "Refusing to cache non-GET request");
      return false;
    }

    let copy = response.duplicate();
    match self.storage.put_entry(&self.name, &request.cache_key(), copy) {
      Ok(()) => {
        debug!(bucket = %self.name, url = %request.url, status = response.status, "Stored response");
        true
      }
      Err(e) => {
        warn!(bucket = %self.name, url = %request.url, error = %e, "Cache write failed, dropping");
        false
      }
    }
  }

  /// Request keys currently stored.
  #[cfg(test)]
  pub fn keys(&self) -> Vec<String> {
    self.storage.entry_keys(&self.name).unwrap_or_else(|e| {
      warn!(bucket = %self.name, error = %e, "Failed to list bucket entries");
      Vec::new()
    })
  }
}
