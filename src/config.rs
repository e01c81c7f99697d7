use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::{DEFAULT_TTL_SECS, MAX_TTL_SECS};
use crate::remote::MAX_BATCH_WRITES;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub cache: CacheConfig,
  pub query: QueryConfig,
  pub batch: BatchConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Seconds a cached read stays valid
  pub ttl_secs: i64,
  /// Upper bound on cached keys (least recently used evicted first).
  /// Unbounded when absent.
  pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: DEFAULT_TTL_SECS,
      max_entries: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
  pub default_page_size: usize,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      default_page_size: 20,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
  /// Items per atomic chunk, at most the store limit of 500
  pub chunk_size: usize,
}

impl Default for BatchConfig {
  fn default() -> Self {
    Self {
      chunk_size: MAX_BATCH_WRITES,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive, e.g. "info" or "docbridge=debug". `RUST_LOG` wins.
  pub level: String,
  /// Write daily-rolling log files here instead of stderr.
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./docbridge.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/docbridge/config.yaml
  ///
  /// Falls back to defaults when no file is found.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("docbridge.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("docbridge").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Reject values the access layer cannot honor.
  pub fn validate(&self) -> Result<()> {
    if !(0..=MAX_TTL_SECS).contains(&self.cache.ttl_secs) {
      return Err(eyre!(
        "cache.ttl_secs must be between 0 and {}",
        MAX_TTL_SECS
      ));
    }
    if self.cache.max_entries == Some(0) {
      return Err(eyre!("cache.max_entries must be at least 1"));
    }
    if self.query.default_page_size == 0 {
      return Err(eyre!("query.default_page_size must be at least 1"));
    }
    if self.batch.chunk_size == 0 || self.batch.chunk_size > MAX_BATCH_WRITES {
      return Err(eyre!(
        "batch.chunk_size must be between 1 and {}",
        MAX_BATCH_WRITES
      ));
    }
    Ok(())
  }
}
