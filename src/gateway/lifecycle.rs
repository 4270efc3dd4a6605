//! Install and activate handlers.

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::Gateway;
use crate::cache::{BucketStorage, Role};

/// Storage key remembering which deployment was last activated.
const REGISTRATION_KEY: &str = "registration";

/// Where the gateway is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Idle,
  Installing,
  Installed,
  /// Migrating namespaces; fetches wait until this finishes
  Activating,
  Serving,
}

/// Outcome of warming the static manifest.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
  pub warmed: Vec<String>,
  pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
  /// Stale buckets deleted, all roles
  pub purged: Vec<String>,
  pub claimed_clients: usize,
}

impl<S: BucketStorage> Gateway<S> {
  #[cfg(test)]
  pub async fn state(&self) -> LifecycleState {
    *self.state.read().await
  }

  /// `{static_version}:{api_version}` of this deployment.
  fn deployment_tag(&self) -> String {
    format!(
      "{}:{}",
      self.config.static_version, self.config.api_version
    )
  }

  /// True if this exact deployment has been activated against the store before.
  pub fn is_registered(&self) -> bool {
    match self.storage.get_meta(REGISTRATION_KEY) {
      Ok(registered) => registered.as_deref() == Some(self.deployment_tag().as_str()),
      Err(e) => {
        warn!(error = %e, "Failed to read registration");
        false
      }
    }
  }

  /// Start serving without reinstalling an already activated deployment.
  pub async fn resume(&self) {
    *self.state.write().await = LifecycleState::Serving;
    debug!(deployment = %self.deployment_tag(), "Resumed registered deployment");
  }

  /// Create the current buckets and warm the static one with the manifest.
  ///
  /// Manifest entries are fetched independently; a failing entry is logged and
  /// reported but never aborts the install. A gateway that is already serving
  /// keeps serving until the next activation.
  pub async fn on_install(&self) -> InstallReport {
    self.advance_unless_serving(LifecycleState::Installing).await;
    info!(deployment = %self.deployment_tag(), "Installing");

    // Take over as soon as install finishes
    self.host.skip_waiting().await;

    for role in Role::ALL {
      if let Err(e) = self.bucket(role).open() {
        warn!(role = %role, error = %e, "Failed to open bucket");
      }
    }

    let bucket = self.bucket(Role::Static);
    let warmed = join_all(self.config.static_manifest.iter().map(|entry| {
      let bucket = &bucket;
      async move {
        let request = match self.request(entry) {
          Ok(request) => request,
          Err(e) => {
            warn!(entry = %entry, error = %e, "Skipping manifest entry");
            return (entry.clone(), false);
          }
        };

        match self.network.fetch(&request).await {
          Ok(response) if response.is_ok() => {
            let stored = bucket.store(&request, &response);
            (entry.clone(), stored)
          }
          Ok(response) => {
            warn!(entry = %entry, status = response.status, "Manifest entry not available");
            (entry.clone(), false)
          }
          Err(e) => {
            warn!(entry = %entry, error = %e, "Failed to warm manifest entry");
            (entry.clone(), false)
          }
        }
      }
    }))
    .await;

    let mut report = InstallReport::default();
    for (entry, ok) in warmed {
      if ok {
        report.warmed.push(entry);
      } else {
        report.failed.push(entry);
      }
    }

    info!(
      warmed = report.warmed.len(),
      failed = report.failed.len(),
      "Install finished"
    );
    self.advance_unless_serving(LifecycleState::Installed).await;

    report
  }

  async fn advance_unless_serving(&self, next: LifecycleState) {
    let mut state = self.state.write().await;
    if *state != LifecycleState::Serving {
      *state = next;
    }
  }

  /// Purge stale namespaces, then claim open clients.
  ///
  /// The lifecycle lock is held for writing throughout, so no fetch is
  /// classified until the migration and takeover are both done.
  pub async fn on_activate(&self) -> ActivationReport {
    let mut state = self.state.write().await;
    *state = LifecycleState::Activating;

    let mut report = ActivationReport::default();
    for role in Role::ALL {
      match self.namespaces.purge_stale(role) {
        Ok(purged) => report.purged.extend(purged),
        Err(e) => warn!(role = %role, error = %e, "Failed to purge stale buckets"),
      }
    }

    report.claimed_clients = self.host.claim_clients().await;

    if let Err(e) = self
      .storage
      .set_meta(REGISTRATION_KEY, &self.deployment_tag())
    {
      warn!(error = %e, "Failed to record registration");
    }

    *state = LifecycleState::Serving;
    info!(
      purged = report.purged.len(),
      clients = report.claimed_clients,
      "Activated"
    );

    report
  }
}
