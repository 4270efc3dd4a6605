//! Versioned bucket naming and stale-bucket purging.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::storage::BucketStorage;

/// Functional role of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  /// Application shell: markup, scripts, styles, icons
  Static,
  /// Read responses of the remote API
  Api,
}

impl Role {
  pub const ALL: [Role; 2] = [Role::Static, Role::Api];

  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Static => "static",
      Role::Api => "api",
    }
  }
}

impl std::fmt::Display for Role {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// True if `value` can be used as one `-`-separated part of a bucket name.
pub fn is_name_segment(value: &str) -> bool {
  !value.is_empty() && !value.contains('-')
}

/// Maps roles to their current bucket, named `{app}-{role}-{version}`.
///
/// Only buckets inside this naming scheme are ever considered stale, so
/// unrelated buckets sharing the store are left alone.
pub struct NamespaceManager<S: BucketStorage> {
  storage: Arc<S>,
  app_name: String,
  static_version: String,
  api_version: String,
}

impl<S: BucketStorage> NamespaceManager<S> {
  pub fn new(
    storage: Arc<S>,
    app_name: impl Into<String>,
    static_version: impl Into<String>,
    api_version: impl Into<String>,
  ) -> Self {
    Self {
      storage,
      app_name: app_name.into(),
      static_version: static_version.into(),
      api_version: api_version.into(),
    }
  }

  fn prefix(&self, role: Role) -> String {
    format!("{}-{}-", self.app_name, role)
  }

  fn version(&self, role: Role) -> &str {
    match role {
      Role::Static => &self.static_version,
      Role::Api => &self.api_version,
    }
  }

  /// Bucket currently serving `role`.
  pub fn current_bucket(&self, role: Role) -> String {
    format!("{}{}", self.prefix(role), self.version(role))
  }

  /// Version segment of `bucket` if it is named `{app}-{role}-{version}`.
  ///
  /// The version must be a single segment, so `shop-api-static-v1` belongs to
  /// an app called `shop-api`, not to the api role of `shop`.
  fn owned_version<'a>(&self, bucket: &'a str, role: Role) -> Option<&'a str> {
    bucket
      .strip_prefix(&self.prefix(role))
      .filter(|version| is_name_segment(version))
  }

  /// Role whose naming scheme `bucket` belongs to, if any.
  pub fn role_of(&self, bucket: &str) -> Option<Role> {
    Role::ALL
      .into_iter()
      .find(|role| self.owned_version(bucket, *role).is_some())
  }

  /// True if `bucket` belongs to `role`'s scheme but is not its current bucket.
  pub fn is_stale(&self, bucket: &str, role: Role) -> bool {
    self
      .owned_version(bucket, role)
      .is_some_and(|version| version != self.version(role))
  }

  /// Delete every stale bucket of `role`, returning the deleted names.
  pub fn purge_stale(&self, role: Role) -> Result<Vec<String>> {
    let mut purged = Vec::new();

    for bucket in self.storage.bucket_names()? {
      if !self.is_stale(&bucket, role) {
        continue;
      }
      if self.storage.delete_bucket(&bucket)? {
        info!(bucket = %bucket, role = %role, "Deleted stale bucket");
        purged.push(bucket);
      }
    }

    Ok(purged)
  }
}
