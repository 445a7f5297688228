//! Warehouse configuration.
//!
//! Read from an optional TOML file, then overridden by `RUSSTAT_*`
//! environment variables, e.g. `RUSSTAT_STORE_PATH=/var/lib/russtat.db`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use russtat_core::timestamp::TimestampFormat;
use serde::Deserialize;

use crate::Result;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "RUSSTAT";

/// Runtime warehouse configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
  /// SQLite database file; a leading `~/` expands to `$HOME`.
  pub store_path:       PathBuf,
  /// chrono format of the `prepared` and `updated` release timestamps.
  pub timestamp_format: String,
  /// How long a writer waits for another connection's lock.
  pub busy_timeout_ms:  u64,
}

impl Default for WarehouseConfig {
  fn default() -> Self {
    Self {
      store_path:       PathBuf::from("russtat.db"),
      timestamp_format: TimestampFormat::default().as_str().to_owned(),
      busy_timeout_ms:  5_000,
    }
  }
}

impl WarehouseConfig {
  /// Load from `path` (if given and present) and the environment.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    Self::from_builder(builder)
  }

  pub(crate) fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> Result<Self> {
    let settings = builder
      .add_source(config::Environment::with_prefix(ENV_PREFIX))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn timestamp_format(&self) -> TimestampFormat {
    TimestampFormat::new(self.timestamp_format.clone())
  }

  /// The database path with `~` expanded.
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }
}

fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
