use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub queue: QueueConfig,
  #[serde(default)]
  pub worker: WorkerConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Origin of the StockWise server, e.g. `https://stock.example.com`
  pub url: String,
  #[serde(default = "default_sync_path")]
  pub sync_path: String,
  /// Whole-request timeout. Unset means the HTTP client default (none).
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
  /// Queue database (defaults to the data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStrategy {
  /// Cache only the static asset manifest; HTML, API and auth always hit the network
  #[default]
  AssetOnly,
  /// Also cache navigational routes; only same-origin manifest requests are intercepted
  Navigation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Cache generation name. Changing it discards every older cache on activation.
  pub version: String,
  pub strategy: WorkerStrategy,
  /// Static asset paths fetched at install time
  pub assets: Vec<String>,
  /// Navigational routes, cached only by the `navigation` strategy
  pub routes: Vec<String>,
  pub api_prefixes: Vec<String>,
  pub auth_prefixes: Vec<String>,
  /// Cache database (defaults to the data directory)
  pub cache_path: Option<PathBuf>,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      version: "kurmistock-static-v3".to_string(),
      strategy: WorkerStrategy::default(),
      assets: [
        "/static/app.js",
        "/static/styles.css",
        "/static/manifest.webmanifest",
        "/static/icons/icon-192.png",
        "/static/icons/icon-512.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      routes: vec!["/".to_string(), "/dashboard".to_string()],
      api_prefixes: vec!["/api/".to_string()],
      auth_prefixes: vec!["/auth/".to_string()],
      cache_path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
  /// Path probed to decide whether the server is reachable
  pub probe_path: String,
  pub interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_path: "/".to_string(),
      interval_secs: 5,
    }
  }
}

impl ConnectivityConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }
}

fn default_sync_path() -> String {
  "/api/sync".to_string()
}

impl ServerConfig {
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.url).map_err(|e| eyre!("Invalid server url {}: {}", self.url, e))
  }

  /// Resolve a path (or absolute URL) against the server origin
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .base_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }

  pub fn sync_endpoint(&self) -> Result<Url> {
    self.resolve(&self.sync_path)
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_secs.map(Duration::from_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./stockwise.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/stockwise/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/stockwise/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("stockwise.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("stockwise").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.server.base_url()?;
    Ok(config)
  }

  /// Get the API token from the environment, if one is set.
  ///
  /// Checks STOCKWISE_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("STOCKWISE_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("server:\n  url: http://localhost:5000\n").unwrap();

    assert_eq!(config.server.sync_path, "/api/sync");
    assert_eq!(config.server.timeout(), None);
    assert_eq!(config.worker.version, "kurmistock-static-v3");
    assert_eq!(config.worker.strategy, WorkerStrategy::AssetOnly);
    assert_eq!(config.worker.assets.len(), 5);
    assert_eq!(config.connectivity.interval(), Duration::from_secs(5));
    assert_eq!(
      config.server.sync_endpoint().unwrap().as_str(),
      "http://localhost:5000/api/sync"
    );
  }

  #[test]
  fn test_worker_section_overrides() {
    let yaml = r#"
server:
  url: https://stock.example.com
worker:
  version: v9
  strategy: navigation
  assets: [/static/app.js]
  routes: [/dashboard]
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.worker.version, "v9");
    assert_eq!(config.worker.strategy, WorkerStrategy::Navigation);
    assert_eq!(config.worker.assets, vec!["/static/app.js"]);
    // Unset fields keep their defaults
    assert_eq!(config.worker.api_prefixes, vec!["/api/"]);
  }

  #[test]
  fn test_example_config_parses() {
    let config = Config::from_yaml(include_str!("../config.example.yaml")).unwrap();
    assert_eq!(config.worker.routes, vec!["/", "/dashboard"]);
    assert!(config.queue.path.is_none());
  }

  #[test]
  fn test_invalid_server_url_is_rejected() {
    assert!(Config::from_yaml("server:\n  url: not a url\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.yaml");
    assert!(Config::load(Some(missing.as_path())).is_err());
  }

  #[test]
  fn test_load_from_explicit_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stockwise.yaml");
    std::fs::write(&path, "server:\n  url: http://10.0.0.2:8000\n  sync_path: /v2/sync\n").unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(
      config.server.sync_endpoint().unwrap().as_str(),
      "http://10.0.0.2:8000/v2/sync"
    );
  }
}
