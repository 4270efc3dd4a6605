//! Host adapter: turns install/activate/fetch/message events into calls on
//! the gateway's handler methods.
//!
//! Every event runs as its own task. The host keeps track of all of them and
//! [`Host::drain`] waits until each one has settled, failed branches included.

use async_trait::async_trait;
use color_eyre::Result;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::cache::BucketStorage;
use crate::gateway::Gateway;
use crate::http::{Request, Response};

/// Whether the user allows notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
  #[default]
  Granted,
  Denied,
  /// Not decided yet
  Default,
}

/// Capabilities the gateway needs from whatever environment hosts it.
#[async_trait]
pub trait HostEnvironment: Send + Sync {
  /// Activate the new version without waiting for old clients to go away.
  async fn skip_waiting(&self);

  /// Take control of every open client. Returns how many were claimed.
  async fn claim_clients(&self) -> usize;

  async fn notification_permission(&self) -> NotificationPermission;

  async fn show_notification(&self, title: &str, body: &str) -> Result<()>;
}

/// Command-line host: no other clients, notifications go to stdout.
pub struct ConsoleEnvironment {
  permission: NotificationPermission,
}

impl ConsoleEnvironment {
  pub fn new(permission: NotificationPermission) -> Self {
    Self { permission }
  }
}

#[async_trait]
impl HostEnvironment for ConsoleEnvironment {
  async fn skip_waiting(&self) {
    debug!("skip_waiting requested");
  }

  async fn claim_clients(&self) -> usize {
    0
  }

  async fn notification_permission(&self) -> NotificationPermission {
    self.permission
  }

  async fn show_notification(&self, title: &str, body: &str) -> Result<()> {
    println!("[{}] {}", title, body);
    Ok(())
  }
}

/// Events delivered to the gateway
#[derive(Debug)]
pub enum HostEvent {
  Install,
  Activate,
  /// Application request; the response goes back through `reply`
  Fetch {
    request: Request,
    reply: oneshot::Sender<Result<Response>>,
  },
  /// Control message posted by the application
  Message(Value),
}

/// Dispatches events to a shared gateway.
pub struct Host<S: BucketStorage + 'static> {
  gateway: Arc<Gateway<S>>,
  tx: mpsc::UnboundedSender<HostEvent>,
  rx: mpsc::UnboundedReceiver<HostEvent>,
  tasks: JoinSet<()>,
}

impl<S: BucketStorage + 'static> Host<S> {
  pub fn new(gateway: Gateway<S>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    Self {
      gateway: Arc::new(gateway),
      tx,
      rx,
      tasks: JoinSet::new(),
    }
  }

  pub fn gateway(&self) -> &Arc<Gateway<S>> {
    &self.gateway
  }

  /// Get a sender for posting events
  pub fn sender(&self) -> mpsc::UnboundedSender<HostEvent> {
    self.tx.clone()
  }

  /// Bring the gateway to Serving.
  ///
  /// An unchanged deployment that was already activated resumes directly;
  /// otherwise install runs to completion, then activate.
  pub async fn start(&mut self) {
    if self.gateway.is_registered() {
      self.gateway.resume().await;
      return;
    }

    self.dispatch(HostEvent::Install);
    self.drain().await;
    self.dispatch(HostEvent::Activate);
    self.drain().await;
  }

  /// Run `event` as an independent task.
  pub fn dispatch(&mut self, event: HostEvent) {
    let gateway = Arc::clone(&self.gateway);

    self.tasks.spawn(async move {
      match event {
        HostEvent::Install => {
          gateway.on_install().await;
        }
        HostEvent::Activate => {
          gateway.on_activate().await;
        }
        HostEvent::Fetch { request, reply } => {
          let result = gateway.on_fetch(request).await;
          if reply.send(result).is_err() {
            debug!("Fetch caller went away before the response was ready");
          }
        }
        HostEvent::Message(message) => {
          gateway.on_message(message).await;
        }
      }
    });
  }

  /// Dispatch events until every sender is dropped, then wait for all tasks.
  pub async fn run(mut self) {
    // Only external senders keep the loop alive
    let (closed, _) = mpsc::unbounded_channel();
    drop(std::mem::replace(&mut self.tx, closed));

    while self.pump().await {}

    self.drain().await;
  }

  /// Dispatch the next event or reap a finished task, whichever comes first.
  /// Returns false once every sender is gone.
  async fn pump(&mut self) -> bool {
    tokio::select! {
      event = self.rx.recv() => match event {
        Some(event) => {
          self.dispatch(event);
          true
        }
        None => false,
      },
      Some(joined) = self.tasks.join_next() => {
        Self::settled(joined);
        true
      }
    }
  }

  /// Wait until every dispatched task has settled.
  pub async fn drain(&mut self) {
    while let Some(joined) = self.tasks.join_next().await {
      Self::settled(joined);
    }
  }

  /// Number of dispatched tasks not yet reaped.
  #[cfg(test)]
  pub fn pending(&self) -> usize {
    self.tasks.len()
  }

  fn settled(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
      error!(error = %e, "Event task failed");
    }
  }
}
