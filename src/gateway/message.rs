//! Control messages posted by the application.

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::Gateway;
use crate::cache::{Bucket, BucketStorage, Role};
use crate::host::NotificationPermission;

/// A recognised control message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum Directive {
  /// Warm the API cache with `url`, or with the bulk listing when absent
  #[serde(rename = "CACHE_POKEMON")]
  WarmApiCache {
    #[serde(default)]
    url: Option<String>,
  },
  #[serde(rename = "SHOW_NOTIFICATION")]
  ShowNotification { body: String },
}

impl Directive {
  /// Parse a raw message. Unknown types and malformed payloads yield `None`.
  pub fn parse(message: &Value) -> Option<Self> {
    Self::deserialize(message).ok()
  }
}

/// What handling a message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
  Warmed(WarmReport),
  Notified { shown: bool },
  Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
  pub stored: Vec<String>,
  pub failed: Vec<String>,
}

/// Shape of a paginated listing: `{ "results": [{ "url": ... }] }`
#[derive(Debug, Deserialize)]
struct Listing {
  #[serde(default)]
  results: Vec<ListingItem>,
}

#[derive(Debug, Deserialize)]
struct ListingItem {
  url: String,
}

impl<S: BucketStorage> Gateway<S> {
  /// Handle a control message from the application.
  pub async fn on_message(&self, message: Value) -> MessageOutcome {
    let Some(directive) = Directive::parse(&message) else {
      debug!(message = %message, "Ignoring unrecognised message");
      return MessageOutcome::Ignored;
    };

    match directive {
      Directive::WarmApiCache { url } => MessageOutcome::Warmed(self.warm_api(url).await),
      Directive::ShowNotification { body } => MessageOutcome::Notified {
        shown: self.notify(&body).await,
      },
    }
  }

  /// Fetch `url` (or the bulk listing) into the API bucket.
  ///
  /// Repeating this is harmless: entries are replaced wholesale.
  async fn warm_api(&self, url: Option<String>) -> WarmReport {
    let bulk = url.is_none();
    let target = url.unwrap_or_else(|| self.config.api_listing_url.clone());
    let bucket = self.bucket(Role::Api);
    if let Err(e) = bucket.open() {
      warn!(bucket = %bucket.name(), error = %e, "Failed to open bucket");
    }

    let mut report = WarmReport::default();
    let listing = self.warm_one(&bucket, &target, &mut report).await;

    if bulk && self.config.warm.follow_results {
      if let Some(listing) = listing {
        let concurrency = self.config.warm.concurrency.max(1);
        let results: Vec<(String, bool)> = stream::iter(listing.results)
          .map(|item| {
            let bucket = &bucket;
            async move {
              let mut item_report = WarmReport::default();
              self.warm_one(bucket, &item.url, &mut item_report).await;
              (item.url, item_report.failed.is_empty())
            }
          })
          .buffer_unordered(concurrency)
          .collect()
          .await;

        for (url, ok) in results {
          if ok {
            report.stored.push(url);
          } else {
            report.failed.push(url);
          }
        }
      }
    }

    info!(
      target = %target,
      stored = report.stored.len(),
      failed = report.failed.len(),
      "Warmed API cache"
    );
    report
  }

  /// Fetch and store one URL. Returns the parsed listing when the body is one.
  async fn warm_one(&self, bucket: &Bucket<S>, target: &str, report: &mut WarmReport) -> Option<Listing> {
    let request = match self.request(target) {
      Ok(request) => request,
      Err(e) => {
        warn!(target = %target, error = %e, "Skipping warm target");
        report.failed.push(target.to_string());
        return None;
      }
    };

    match self.network.fetch(&request).await {
      Ok(response) if response.status == 200 => {
        if bucket.store(&request, &response) {
          report.stored.push(target.to_string());
        } else {
          report.failed.push(target.to_string());
        }
        response.json::<Listing>().ok()
      }
      Ok(response) => {
        warn!(target = %target, status = response.status, "Warm target not available");
        report.failed.push(target.to_string());
        None
      }
      Err(e) => {
        warn!(target = %target, error = %e, "Failed to warm");
        report.failed.push(target.to_string());
        None
      }
    }
  }

  /// Forward a notification to the host if permitted.
  async fn notify(&self, body: &str) -> bool {
    match self.host.notification_permission().await {
      NotificationPermission::Granted => {
        match self.host.show_notification(&self.config.title, body).await {
          Ok(()) => true,
          Err(e) => {
            warn!(error = %e, "Failed to show notification");
            false
          }
        }
      }
      permission => {
        debug!(permission = ?permission, "Notifications not permitted");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::test_support::*;
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_directives() {
    assert_eq!(
      Directive::parse(&json!({ "type": "CACHE_POKEMON" })),
      Some(Directive::WarmApiCache { url: None })
    );
    assert_eq!(
      Directive::parse(&json!({ "type": "CACHE_POKEMON", "url": "https://x/1" })),
      Some(Directive::WarmApiCache {
        url: Some("https://x/1".to_string())
      })
    );
    assert_eq!(
      Directive::parse(&json!({ "type": "SHOW_NOTIFICATION", "body": "hi" })),
      Some(Directive::ShowNotification {
        body: "hi".to_string()
      })
    );
  }

  #[test]
  fn test_parse_rejects_unknown_and_malformed() {
    assert_eq!(Directive::parse(&json!({ "type": "SKIP_WAITING" })), None);
    assert_eq!(Directive::parse(&json!({ "type": "SHOW_NOTIFICATION" })), None);
    assert_eq!(Directive::parse(&json!("CACHE_POKEMON")), None);
    assert_eq!(Directive::parse(&json!({ "kind": "CACHE_POKEMON" })), None);
  }

  #[tokio::test]
  async fn test_bulk_warm_is_idempotent() {
    let harness = Harness::serving(test_config()).await;
    harness.network.respond(API_LISTING, 200, r#"{"results":[]}"#);

    let first = harness
      .gateway
      .on_message(json!({ "type": "CACHE_POKEMON" }))
      .await;
    let keys_once = harness.gateway.bucket(Role::Api).keys();

    harness.network.respond(API_LISTING, 200, r#"{"results":[],"v":2}"#);
    let second = harness
      .gateway
      .on_message(json!({ "type": "CACHE_POKEMON" }))
      .await;
    let keys_twice = harness.gateway.bucket(Role::Api).keys();

    assert_eq!(first, second);
    assert_eq!(keys_once, keys_twice);
    assert_eq!(keys_once.len(), 1);

    let request = harness.gateway.request(API_LISTING).unwrap();
    let stored = harness.gateway.bucket(Role::Api).lookup(&request).unwrap();
    assert_eq!(stored.text(), r#"{"results":[],"v":2}"#);
  }

  #[tokio::test]
  async fn test_warm_specific_url() {
    let harness = Harness::serving(test_config()).await;
    harness.network.respond(API_ITEM, 200, r#"{"name":"pikachu"}"#);

    let outcome = harness
      .gateway
      .on_message(json!({ "type": "CACHE_POKEMON", "url": API_ITEM }))
      .await;

    assert_eq!(
      outcome,
      MessageOutcome::Warmed(WarmReport {
        stored: vec![API_ITEM.to_string()],
        failed: vec![],
      })
    );

    harness.network.go_offline();
    let request = harness.gateway.request(API_ITEM).unwrap();
    let response = harness.gateway.on_fetch(request).await.unwrap();
    assert_eq!(response.text(), r#"{"name":"pikachu"}"#);
  }

  #[tokio::test]
  async fn test_warm_follows_listing_results() {
    let mut config = test_config();
    config.warm.follow_results = true;
    config.warm.concurrency = 2;
    let harness = Harness::serving(config).await;

    let listing = json!({
      "results": [
        { "name": "bulbasaur", "url": "https://api.example/v2/item/1" },
        { "name": "ivysaur", "url": "https://api.example/v2/item/2" },
        { "name": "venusaur", "url": "https://api.example/v2/item/3" },
      ]
    });
    harness
      .network
      .respond(API_LISTING, 200, &listing.to_string());
    harness.network.respond("https://api.example/v2/item/1", 200, "1");
    harness.network.respond("https://api.example/v2/item/2", 200, "2");
    harness.network.fail("https://api.example/v2/item/3");

    let outcome = harness
      .gateway
      .on_message(json!({ "type": "CACHE_POKEMON" }))
      .await;

    let MessageOutcome::Warmed(report) = outcome else {
      panic!("expected a warm report, got {:?}", outcome);
    };
    assert_eq!(report.stored.len(), 3);
    assert_eq!(report.failed, vec!["https://api.example/v2/item/3"]);
    assert_eq!(harness.gateway.bucket(Role::Api).keys().len(), 3);
  }

  #[tokio::test]
  async fn test_warm_offline_stores_nothing() {
    let harness = Harness::serving(test_config()).await;
    harness.network.go_offline();

    let outcome = harness
      .gateway
      .on_message(json!({ "type": "CACHE_POKEMON" }))
      .await;

    assert_eq!(
      outcome,
      MessageOutcome::Warmed(WarmReport {
        stored: vec![],
        failed: vec![API_LISTING.to_string()],
      })
    );
    assert!(harness.gateway.bucket(Role::Api).keys().is_empty());
  }

  #[tokio::test]
  async fn test_show_notification() {
    let harness = Harness::serving(test_config()).await;

    let outcome = harness
      .gateway
      .on_message(json!({ "type": "SHOW_NOTIFICATION", "body": "New Pokémon cached" }))
      .await;

    assert_eq!(outcome, MessageOutcome::Notified { shown: true });
    assert_eq!(
      *harness.host.notifications.lock().unwrap(),
      vec![("PokePWA".to_string(), "New Pokémon cached".to_string())]
    );
  }

  #[tokio::test]
  async fn test_notification_without_permission() {
    let harness = Harness::serving(test_config()).await;
    *harness.host.permission.lock().unwrap() = NotificationPermission::Denied;

    let outcome = harness
      .gateway
      .on_message(json!({ "type": "SHOW_NOTIFICATION", "body": "hi" }))
      .await;

    assert_eq!(outcome, MessageOutcome::Notified { shown: false });
    assert!(harness.host.notifications.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_unknown_messages_are_ignored() {
    let harness = Harness::serving(test_config()).await;
    let outcome = harness.gateway.on_message(json!({ "type": "NOPE" })).await;
    assert_eq!(outcome, MessageOutcome::Ignored);
    assert!(harness.network.calls().is_empty());
  }
}
