//! The offline caching gateway.
//!
//! Every outgoing request from the application goes through [`Gateway::on_fetch`].
//! GET requests are classified as static assets or API reads and resolved with
//! the strategy configured for that role; everything else is forwarded to the
//! network untouched. The lifecycle handlers (`on_install`, `on_activate`) and
//! the control channel (`on_message`) live in their own modules.

mod classify;
mod lifecycle;
mod message;
mod offline;
mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

pub use lifecycle::LifecycleState;
pub use message::MessageOutcome;
pub use strategy::Strategy;

use classify::classify;

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::cache::{Bucket, BucketStorage, NamespaceManager, Role};
use crate::config::GatewayConfig;
use crate::host::HostEnvironment;
use crate::http::{Request, Response, ResponseSource};
use crate::network::Network;

/// Caching gateway between the application and the network.
pub struct Gateway<S: BucketStorage> {
  config: GatewayConfig,
  origin: Url,
  storage: Arc<S>,
  namespaces: NamespaceManager<S>,
  network: Arc<dyn Network>,
  host: Arc<dyn HostEnvironment>,
  /// Held for writing while activation migrates buckets, for reading by fetches
  state: RwLock<LifecycleState>,
}

impl<S: BucketStorage> Gateway<S> {
  pub fn new(
    config: GatewayConfig,
    storage: Arc<S>,
    network: Arc<dyn Network>,
    host: Arc<dyn HostEnvironment>,
  ) -> Result<Self> {
    config.validate()?;
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", config.origin, e))?;

    let namespaces = NamespaceManager::new(
      Arc::clone(&storage),
      &config.app_name,
      &config.static_version,
      &config.api_version,
    );

    Ok(Self {
      config,
      origin,
      storage,
      namespaces,
      network,
      host,
      state: RwLock::new(LifecycleState::Idle),
    })
  }

  pub fn origin(&self) -> &Url {
    &self.origin
  }

  pub fn namespaces(&self) -> &NamespaceManager<S> {
    &self.namespaces
  }

  /// Current bucket for `role`.
  pub fn bucket(&self, role: Role) -> Bucket<S> {
    Bucket::new(Arc::clone(&self.storage), self.namespaces.current_bucket(role))
  }

  /// Build a request for `target`, resolving relative paths against the origin.
  pub fn request(&self, target: &str) -> Result<Request> {
    Request::parse(reqwest::Method::GET, target, &self.origin)
  }

  /// Resolve a request issued by the application.
  ///
  /// Intercepted requests always produce a response (from network, cache or a
  /// synthetic offline answer). Only passthrough requests can fail.
  pub async fn on_fetch(&self, request: Request) -> Result<Response> {
    // Blocks while activation is migrating namespaces
    let state = self.state.read().await;

    if *state != LifecycleState::Serving {
      debug!(url = %request.url, state = ?*state, "Not controlling yet, passing through");
      return self.passthrough(&request).await;
    }

    let classification = classify(&request, &self.config.api_url_pattern);
    let role = match classification.role() {
      Some(role) => role,
      None => return self.passthrough(&request).await,
    };

    let strategy = self.config.strategies.for_role(role);
    debug!(url = %request.url, role = %role, strategy = %strategy, "Intercepted request");

    let response = match strategy {
      Strategy::NetworkFirst => self.network_first(role, &request).await,
      Strategy::CacheFirst => self.cache_first(role, &request).await,
    };

    Ok(response)
  }

  async fn passthrough(&self, request: &Request) -> Result<Response> {
    let response = self.network.fetch(request).await?;
    Ok(response.with_source(ResponseSource::Passthrough))
  }
}
