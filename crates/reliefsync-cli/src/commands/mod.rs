//! Subcommands and the wiring they share

pub mod claims;
pub mod completions;
pub mod config;
pub mod refresh;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use reliefsync_api::HttpRemoteDataSource;
use reliefsync_cache::pool::DatabasePool;
use reliefsync_cache::SqliteWorksiteRepository;
use reliefsync_core::config::Config;
use reliefsync_core::domain::IncidentId;

use crate::output::OutputFormat;

/// Options every subcommand receives from the top-level parser
#[derive(Debug, Clone)]
pub struct CommandEnv {
    pub format: OutputFormat,
    pub config_path: PathBuf,
}

impl CommandEnv {
    pub fn new(format: OutputFormat, config_path: Option<&str>) -> Self {
        Self {
            format,
            config_path: config_path
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_path),
        }
    }

    pub fn load_config(&self) -> Config {
        let config = Config::load_or_default(&self.config_path);
        info!(config_path = %self.config_path.display(), "Loaded configuration");
        config
    }
}

/// Build version stamped on sync stats and change records
///
/// `major * 10_000 + minor * 100 + patch` of this binary.
pub fn app_build_version() -> i64 {
    let part = |s: &str| s.parse::<i64>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10_000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// clap value parser for incident ids
pub fn parse_incident(value: &str) -> Result<IncidentId, String> {
    let id = value
        .parse::<i64>()
        .map_err(|_| format!("'{value}' is not a number"))?;
    IncidentId::new(id).map_err(|e| e.to_string())
}

pub async fn open_database(path: &Path) -> Result<DatabasePool> {
    DatabasePool::new(path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

pub async fn open_store(config: &Config) -> Result<(DatabasePool, Arc<SqliteWorksiteRepository>)> {
    let pool = open_database(&config.storage.database_path).await?;
    let store = Arc::new(SqliteWorksiteRepository::new(pool.pool().clone()));
    Ok((pool, store))
}

/// Remote source using `token` or, failing that, the configured token
pub fn remote_source(config: &Config, token: Option<&str>) -> HttpRemoteDataSource {
    let token = token
        .map(str::to_string)
        .or_else(|| config.remote.access_token.clone());
    HttpRemoteDataSource::new(config.remote.base_url.clone(), token)
}
