use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cache::{is_name_segment, Role};
use crate::gateway::Strategy;
use crate::host::NotificationPermission;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub gateway: GatewayConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub log: LogConfig,
  #[serde(default)]
  pub host: HostConfig,
}

/// Everything the gateway needs to know about one deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
  /// Prefix of every bucket this gateway owns
  pub app_name: String,
  /// Title used for notifications
  pub title: String,
  /// Origin the application shell is served from; relative URLs resolve against it
  pub origin: String,
  pub static_version: String,
  pub api_version: String,
  /// Shell resources warmed at install time
  pub static_manifest: Vec<String>,
  /// Requests whose URL contains this are API reads
  pub api_url_pattern: String,
  /// Listing endpoint warmed by a bulk pre-cache message
  pub api_listing_url: String,
  pub strategies: StrategyConfig,
  pub offline: OfflineConfig,
  pub warm: WarmConfig,
}

impl Default for GatewayConfig {
  fn default() -> Self {
    Self {
      app_name: "pokepwa".to_string(),
      title: "PokePWA".to_string(),
      origin: "http://localhost:3000".to_string(),
      static_version: "v3".to_string(),
      api_version: "v3".to_string(),
      static_manifest: vec!["/".to_string(), "/manifest.json".to_string()],
      api_url_pattern: "pokeapi.co/api/v2/pokemon".to_string(),
      api_listing_url: "https://pokeapi.co/api/v2/pokemon?limit=1000".to_string(),
      strategies: StrategyConfig::default(),
      offline: OfflineConfig::default(),
      warm: WarmConfig::default(),
    }
  }
}

impl GatewayConfig {
  /// Reject names that would make bucket ownership ambiguous.
  pub fn validate(&self) -> Result<()> {
    for (field, value) in [
      ("app_name", &self.app_name),
      ("static_version", &self.static_version),
      ("api_version", &self.api_version),
    ] {
      if !is_name_segment(value) {
        return Err(eyre!(
          "gateway.{} must be non-empty and contain no '-': '{}'",
          field,
          value
        ));
      }
    }
    Ok(())
  }
}

/// Strategy per role.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StrategyConfig {
  #[serde(rename = "static")]
  pub static_assets: Strategy,
  pub api: Strategy,
}

impl Default for StrategyConfig {
  fn default() -> Self {
    Self {
      static_assets: Strategy::CacheFirst,
      api: Strategy::NetworkFirst,
    }
  }
}

impl StrategyConfig {
  pub fn for_role(&self, role: Role) -> Strategy {
    match role {
      Role::Static => self.static_assets,
      Role::Api => self.api,
    }
  }
}

/// Synthetic response returned when neither network nor cache can answer an API read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
  /// 200 keeps JSON clients on their happy path; 408/503 signal the error explicitly
  pub status: u16,
  pub message: String,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      status: 200,
      message: "You are offline and this data has not been cached yet. Connect to the internet to load it."
        .to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarmConfig {
  /// Also warm every `results[].url` of the bulk listing
  pub follow_results: bool,
  /// Max fetches in flight while following listing results
  pub concurrency: usize,
}

impl Default for WarmConfig {
  fn default() -> Self {
    Self {
      follow_results: false,
      concurrency: 8,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self { timeout_secs: 15 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// When false nothing is cached and every lookup misses
  pub enabled: bool,
  /// SQLite database path (default: $XDG_DATA_HOME/swgate/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Write daily-rotated log files here instead of stderr
  pub directory: Option<PathBuf>,
}

/// Capabilities of the command-line host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
  /// Answer given when the gateway asks to show a notification
  pub notifications: NotificationPermission,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swgate.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swgate/config.yaml
  ///
  /// Falls back to the built-in deployment defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        debug!("No configuration file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swgate.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swgate").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.gateway.validate()?;
    Ok(config)
  }
}
