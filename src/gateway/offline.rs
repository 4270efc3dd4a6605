//! Locally fabricated responses for when neither network nor cache can answer.

use serde::Serialize;

use crate::config::OfflineConfig;
use crate::http::{Response, ResponseSource};

#[derive(Serialize)]
struct OfflineBody<'a> {
  error: &'a str,
  message: &'a str,
}

/// `{"error":"offline","message":...}` with the configured status.
pub fn offline_json(config: &OfflineConfig) -> Response {
  let body = OfflineBody {
    error: "offline",
    message: &config.message,
  };
  // Serializing two string fields cannot fail
  let body = serde_json::to_vec(&body).unwrap_or_default();

  Response::new(
    config.status,
    vec![("content-type".to_string(), "application/json".to_string())],
    body,
  )
  .with_source(ResponseSource::Offline)
}

/// Plain-text placeholder for uncached static resources.
pub fn offline_text() -> Response {
  Response::new(
    503,
    vec![(
      "content-type".to_string(),
      "text/plain; charset=utf-8".to_string(),
    )],
    b"Offline".to_vec(),
  )
  .with_source(ResponseSource::Offline)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::Value;

  #[test]
  fn test_offline_json_shape() {
    let config = OfflineConfig {
      status: 408,
      message: "Connect to load Pokémon".to_string(),
    };
    let response = offline_json(&config);

    assert_eq!(response.status, 408);
    assert_eq!(response.source, ResponseSource::Offline);
    assert_eq!(response.header("content-type"), Some("application/json"));

    let body: Value = response.json().unwrap();
    assert_eq!(body["error"], "offline");
    assert_eq!(body["message"], "Connect to load Pokémon");
  }

  #[test]
  fn test_offline_text() {
    let response = offline_text();
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), "Offline");
  }
}
