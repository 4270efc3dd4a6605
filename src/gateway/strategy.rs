//! Resolution strategies for intercepted requests.

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::offline::{offline_json, offline_text};
use super::Gateway;
use crate::cache::{BucketStorage, Role};
use crate::http::{Request, Response};

/// Order in which network and cache are consulted. The two are never raced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
  /// Network, falling back to cache and then to a synthetic offline response
  NetworkFirst,
  /// Cache, falling back to network and then to the shell or an offline response
  CacheFirst,
}

impl std::fmt::Display for Strategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NetworkFirst => f.write_str("network-first"),
      Self::CacheFirst => f.write_str("cache-first"),
    }
  }
}

impl<S: BucketStorage> Gateway<S> {
  /// Network-first with cache fallback.
  ///
  /// 1. Fetch from network - on 200, store a copy and return it
  /// 2. Any other status is returned uncached
  /// 3. On network failure, serve the cached entry
  /// 4. Nothing cached - synthetic offline JSON
  pub(super) async fn network_first(&self, role: Role, request: &Request) -> Response {
    let bucket = self.bucket(role);

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.status == 200 {
          bucket.store(request, &response);
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed, checking cache");
        if let Some(cached) = bucket.lookup(request) {
          info!(url = %request.url, "Serving from cache while offline");
          return cached;
        }

        warn!(url = %request.url, "Offline and nothing cached");
        offline_json(&self.config.offline)
      }
    }
  }

  /// Cache-first with network fallback.
  ///
  /// 1. Cached entry - return it without touching the network
  /// 2. Fetch from network - on 2xx, store a copy and return it
  /// 3. On network failure, navigations get the cached shell root
  /// 4. Otherwise a synthetic offline response for the role
  pub(super) async fn cache_first(&self, role: Role, request: &Request) -> Response {
    let bucket = self.bucket(role);

    if let Some(cached) = bucket.lookup(request) {
      return cached;
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          bucket.store(request, &response);
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed on cache miss");

        if request.is_navigation() {
          if let Some(root) = self.cached_root() {
            info!(url = %request.url, "Serving cached shell for navigation");
            return root;
          }
        }

        warn!(url = %request.url, role = %role, "Offline and nothing cached");
        match role {
          Role::Api => offline_json(&self.config.offline),
          Role::Static => offline_text(),
        }
      }
    }
  }

  /// Cached root document of the application shell.
  fn cached_root(&self) -> Option<Response> {
    let root = Request::get(self.origin.join("/").ok()?);
    self.bucket(Role::Static).lookup(&root)
  }
}
