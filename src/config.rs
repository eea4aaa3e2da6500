use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Crate configuration. Every field has a default so hosts may run with
/// no config file at all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
  #[serde(default)]
  pub purchases: PurchasesConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchasesConfig {
  /// Remote purchase endpoint (POST, JSON body).
  #[serde(default = "default_endpoint_url")]
  pub endpoint_url: String,
}

impl Default for PurchasesConfig {
  fn default() -> Self {
    Self {
      endpoint_url: default_endpoint_url(),
    }
  }
}

fn default_endpoint_url() -> String {
  "http://localhost:8000/api/purchases".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Total image cache budget in bytes.
  #[serde(default = "default_max_total_bytes")]
  pub max_total_bytes: u64,
  /// Per-image ceiling in bytes; larger images are never cached.
  #[serde(default = "default_max_image_bytes")]
  pub max_image_bytes: u64,
  /// Entries older than this many days are expired.
  #[serde(default = "default_retention_days")]
  pub retention_days: i64,
  /// Fraction of entries evicted per prune pass.
  #[serde(default = "default_prune_fraction")]
  pub prune_fraction: f64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_total_bytes: default_max_total_bytes(),
      max_image_bytes: default_max_image_bytes(),
      retention_days: default_retention_days(),
      prune_fraction: default_prune_fraction(),
    }
  }
}

fn default_max_total_bytes() -> u64 {
  5 * 1024 * 1024
}

fn default_max_image_bytes() -> u64 {
  500 * 1024
}

fn default_retention_days() -> i64 {
  7
}

fn default_prune_fraction() -> f64 {
  0.3
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  /// Script URL the background worker is registered from.
  #[serde(default = "default_script_url")]
  pub script_url: String,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      script_url: default_script_url(),
    }
  }
}

fn default_script_url() -> String {
  "/sw.js".to_string()
}

impl SyncConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storesync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storesync/config.yaml
  ///
  /// Falls back to defaults when no file exists and no explicit path was
  /// given.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("storesync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storesync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: SyncConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
