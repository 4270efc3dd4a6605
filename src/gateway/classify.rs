use crate::cache::Role;
use crate::http::Request;

/// Which path a request takes through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  StaticAsset,
  ApiRead,
  /// Forwarded to the network, never cached
  Passthrough,
}

impl Classification {
  pub fn role(&self) -> Option<Role> {
    match self {
      Self::StaticAsset => Some(Role::Static),
      Self::ApiRead => Some(Role::Api),
      Self::Passthrough => None,
    }
  }
}

/// Classify a request. First match wins:
/// non-GET or non-http(s) -> passthrough, URL contains `api_pattern` -> API,
/// anything else -> static.
pub fn classify(request: &Request, api_pattern: &str) -> Classification {
  if !request.is_get() || !matches!(request.url.scheme(), "http" | "https") {
    return Classification::Passthrough;
  }

  if !api_pattern.is_empty() && request.url.as_str().contains(api_pattern) {
    return Classification::ApiRead;
  }

  Classification::StaticAsset
}
