//! Scripted network, recording host and storage doubles for gateway tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

use super::Gateway;
use crate::cache::{BucketStorage, SqliteStorage};
use crate::config::GatewayConfig;
use crate::host::{HostEnvironment, NotificationPermission};
use crate::http::{Request, Response};
use crate::network::Network;

pub const ORIGIN: &str = "http://localhost:3000";
pub const API_ITEM: &str = "https://api.example/v2/item/25";
pub const API_LISTING: &str = "https://api.example/v2/item?limit=3";

pub fn test_config() -> GatewayConfig {
  GatewayConfig {
    app_name: "testapp".to_string(),
    origin: ORIGIN.to_string(),
    static_version: "v1".to_string(),
    api_version: "v1".to_string(),
    api_url_pattern: "api.example/v2".to_string(),
    api_listing_url: API_LISTING.to_string(),
    ..GatewayConfig::default()
  }
}

fn resolve(target: &str) -> String {
  Url::parse(ORIGIN)
    .and_then(|origin| origin.join(target))
    .map(|url| url.to_string())
    .unwrap_or_else(|_| target.to_string())
}

/// Network answering from a script. Unknown URLs get a 404.
#[derive(Default)]
pub struct FakeNetwork {
  responses: Mutex<HashMap<String, (u16, Vec<u8>)>>,
  failing: Mutex<HashSet<String>>,
  offline: AtomicBool,
  calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
  pub fn respond(&self, target: &str, status: u16, body: &str) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(resolve(target), (status, body.as_bytes().to_vec()));
  }

  /// Make a single URL fail at the transport level.
  pub fn fail(&self, target: &str) {
    self.failing.lock().unwrap().insert(resolve(target));
  }

  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  /// URLs requested while online, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn clear_calls(&self) {
    self.calls.lock().unwrap().clear();
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.url.to_string();
    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Network unavailable: {}", url));
    }

    self.calls.lock().unwrap().push(url.clone());

    if self.failing.lock().unwrap().contains(&url) {
      return Err(eyre!("Connection reset: {}", url));
    }

    let scripted = self.responses.lock().unwrap().get(&url).cloned();
    Ok(match scripted {
      Some((status, body)) => Response::new(
        status,
        vec![("content-type".to_string(), "application/json".to_string())],
        body,
      ),
      None => Response::new(404, vec![], b"not found".to_vec()),
    })
  }
}

/// Host that records what the gateway asked of it.
pub struct RecordingHost {
  pub skip_waiting: AtomicUsize,
  pub claims: AtomicUsize,
  pub open_clients: usize,
  pub permission: Mutex<NotificationPermission>,
  pub notifications: Mutex<Vec<(String, String)>>,
  /// When set, claiming clients waits until this is notified
  pub claim_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for RecordingHost {
  fn default() -> Self {
    Self {
      skip_waiting: AtomicUsize::new(0),
      claims: AtomicUsize::new(0),
      open_clients: 2,
      permission: Mutex::new(NotificationPermission::Granted),
      notifications: Mutex::new(Vec::new()),
      claim_gate: Mutex::new(None),
    }
  }
}

#[async_trait]
impl HostEnvironment for RecordingHost {
  async fn skip_waiting(&self) {
    self.skip_waiting.fetch_add(1, Ordering::SeqCst);
  }

  async fn claim_clients(&self) -> usize {
    self.claims.fetch_add(1, Ordering::SeqCst);
    let gate = self.claim_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.notified().await;
    }
    self.open_clients
  }

  async fn notification_permission(&self) -> NotificationPermission {
    *self.permission.lock().unwrap()
  }

  async fn show_notification(&self, title: &str, body: &str) -> Result<()> {
    self
      .notifications
      .lock()
      .unwrap()
      .push((title.to_string(), body.to_string()));
    Ok(())
  }
}

/// Storage where every operation fails, as with a full disk.
pub struct FailingStorage;

impl BucketStorage for FailingStorage {
  fn bucket_names(&self) -> Result<Vec<String>> {
    Err(eyre!("storage unavailable"))
  }

  fn open_bucket(&self, _bucket: &str) -> Result<()> {
    Err(eyre!("storage unavailable"))
  }

  fn delete_bucket(&self, _bucket: &str) -> Result<bool> {
    Err(eyre!("storage unavailable"))
  }

  fn get_entry(&self, _bucket: &str, _request_key: &str) -> Result<Option<Response>> {
    Err(eyre!("storage unavailable"))
  }

  fn put_entry(&self, _bucket: &str, _request_key: &str, _response: Response) -> Result<()> {
    Err(eyre!("quota exceeded"))
  }

  fn entry_keys(&self, _bucket: &str) -> Result<Vec<String>> {
    Err(eyre!("storage unavailable"))
  }

  fn get_meta(&self, _key: &str) -> Result<Option<String>> {
    Err(eyre!("storage unavailable"))
  }

  fn set_meta(&self, _key: &str, _value: &str) -> Result<()> {
    Err(eyre!("storage unavailable"))
  }
}

pub struct Harness<S: BucketStorage> {
  pub gateway: Gateway<S>,
  pub network: Arc<FakeNetwork>,
  pub host: Arc<RecordingHost>,
}

impl<S: BucketStorage> Harness<S> {
  fn build(config: GatewayConfig, storage: Arc<S>) -> Self {
    let network = Arc::new(FakeNetwork::default());
    let host = Arc::new(RecordingHost::default());
    let gateway = Gateway::new(config, storage, network.clone(), host.clone()).unwrap();

    Self {
      gateway,
      network,
      host,
    }
  }
}

impl Harness<SqliteStorage> {
  /// Fresh gateway over an empty in-memory store, not yet installed.
  pub fn new(config: GatewayConfig) -> Self {
    Self::build(config, Arc::new(SqliteStorage::open_in_memory().unwrap()))
  }

  /// Gateway over a shared store, e.g. to simulate a redeploy.
  pub fn with_storage(config: GatewayConfig, storage: Arc<SqliteStorage>) -> Self {
    Self::build(config, storage)
  }

  /// Activated gateway with empty buckets.
  pub async fn serving(config: GatewayConfig) -> Self {
    let harness = Self::new(config);
    harness.gateway.on_activate().await;
    harness
  }
}

impl Harness<FailingStorage> {
  pub async fn with_failing_storage(config: GatewayConfig) -> Self {
    let harness = Self::build(config, Arc::new(FailingStorage));
    harness.gateway.on_activate().await;
    harness
  }
}
