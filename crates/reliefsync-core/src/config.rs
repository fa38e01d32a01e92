//! Configuration module for ReliefSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for ReliefSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// How much data the device can hold and process per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCapability {
    /// Low memory or slow storage; page sizes are halved.
    Limited,
    Standard,
}

/// Pull pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Worksites per page for full and short pulls.
    pub page_size: u32,
    pub device_capability: DeviceCapability,
    /// Incidents with at least `page_size * large_incident_page_multiple`
    /// worksites are pulled spatially.
    pub large_incident_page_multiple: u32,
    /// Records per page for flags and form data.
    pub secondary_page_size: u32,
    /// Records per local-store transaction.
    pub commit_batch_size: u32,
    /// Staged pages older than this are refetched.
    pub staging_max_age_secs: u64,
    /// Secondary data younger than this is not refreshed.
    pub secondary_stale_after_secs: u64,
    /// Radius of the area pulled by a spatial sync.
    pub spatial_radius_km: f64,
    /// Moving further than this restarts a spatial sync.
    pub location_change_threshold_km: f64,
    /// Target worksites per grid cell. `None` uses the effective page size.
    pub spatial_cell_population: Option<u32>,
}

/// Local storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Directory for staged page files.
    pub staging_dir: PathBuf,
}

/// Relief-coordination server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// API root, e.g. `https://api.example.org`.
    pub base_url: String,
    /// Bearer token. `None` until the user signs in.
    pub access_token: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/reliefsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("reliefsync")
            .join("config.yaml")
    }
}

impl SyncConfig {
    /// Page size after applying the device capability.
    pub fn effective_page_size(&self) -> u32 {
        scale_for_device(self.page_size, self.device_capability)
    }

    pub fn effective_secondary_page_size(&self) -> u32 {
        scale_for_device(self.secondary_page_size, self.device_capability)
    }

    /// Worksite count at which a first pull switches to spatial sync.
    pub fn large_incident_threshold(&self) -> u64 {
        u64::from(self.effective_page_size()) * u64::from(self.large_incident_page_multiple)
    }

    pub fn cell_population(&self) -> u32 {
        self.spatial_cell_population
            .unwrap_or_else(|| self.effective_page_size())
            .max(1)
    }

    /// Commit batch size clamped to the supported range.
    pub fn effective_commit_batch_size(&self) -> usize {
        self.commit_batch_size
            .clamp(MIN_COMMIT_BATCH_SIZE, MAX_COMMIT_BATCH_SIZE) as usize
    }
}

fn scale_for_device(size: u32, capability: DeviceCapability) -> u32 {
    match capability {
        DeviceCapability::Limited => (size / 2).max(1),
        DeviceCapability::Standard => size.max(1),
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.
// (clippy::derivable_impls)

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 40,
            device_capability: DeviceCapability::Standard,
            large_incident_page_multiple: 15,
            secondary_page_size: 300,
            commit_batch_size: 100,
            staging_max_age_secs: 3600,
            secondary_stale_after_secs: 1800,
            spatial_radius_km: 30.0,
            location_change_threshold_km: 10.0,
            spatial_cell_population: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("reliefsync");
        Self {
            database_path: data_dir.join("reliefsync.db"),
            staging_dir: data_dir.join("staging"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.crisiscleanup.org".to_string(),
            access_token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Bounds for `sync.commit_batch_size`.
pub const MIN_COMMIT_BATCH_SIZE: u32 = 10;
pub const MAX_COMMIT_BATCH_SIZE: u32 = 500;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.page_size < 2 {
            errors.push(ValidationError {
                field: "sync.page_size".into(),
                message: "must be at least 2".into(),
            });
        }
        if self.sync.secondary_page_size < 2 {
            errors.push(ValidationError {
                field: "sync.secondary_page_size".into(),
                message: "must be at least 2".into(),
            });
        }
        if self.sync.large_incident_page_multiple == 0 {
            errors.push(ValidationError {
                field: "sync.large_incident_page_multiple".into(),
                message: "must be greater than 0".into(),
            });
        }
        if !(MIN_COMMIT_BATCH_SIZE..=MAX_COMMIT_BATCH_SIZE).contains(&self.sync.commit_batch_size)
        {
            errors.push(ValidationError {
                field: "sync.commit_batch_size".into(),
                message: format!(
                    "must be in range {MIN_COMMIT_BATCH_SIZE}..={MAX_COMMIT_BATCH_SIZE}"
                ),
            });
        }
        if self.sync.staging_max_age_secs == 0 {
            errors.push(ValidationError {
                field: "sync.staging_max_age_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.spatial_radius_km.is_nan() || self.sync.spatial_radius_km <= 0.0 {
            errors.push(ValidationError {
                field: "sync.spatial_radius_km".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.location_change_threshold_km.is_nan()
            || self.sync.location_change_threshold_km < 0.0
        {
            errors.push(ValidationError {
                field: "sync.location_change_threshold_km".into(),
                message: "must not be negative".into(),
            });
        }
        if self.sync.spatial_cell_population == Some(0) {
            errors.push(ValidationError {
                field: "sync.spatial_cell_population".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- remote ---
        if !(self.remote.base_url.starts_with("http://")
            || self.remote.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("not an http(s) URL: '{}'", self.remote.base_url),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use reliefsync_core::config::{ConfigBuilder, DeviceCapability};
///
/// let config = ConfigBuilder::new()
///     .sync_page_size(60)
///     .sync_device_capability(DeviceCapability::Limited)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_page_size(mut self, page_size: u32) -> Self {
        self.config.sync.page_size = page_size;
        self
    }

    pub fn sync_device_capability(mut self, capability: DeviceCapability) -> Self {
        self.config.sync.device_capability = capability;
        self
    }

    pub fn sync_large_incident_page_multiple(mut self, multiple: u32) -> Self {
        self.config.sync.large_incident_page_multiple = multiple;
        self
    }

    pub fn sync_secondary_page_size(mut self, page_size: u32) -> Self {
        self.config.sync.secondary_page_size = page_size;
        self
    }

    pub fn sync_commit_batch_size(mut self, batch_size: u32) -> Self {
        self.config.sync.commit_batch_size = batch_size;
        self
    }

    pub fn sync_staging_max_age_secs(mut self, seconds: u64) -> Self {
        self.config.sync.staging_max_age_secs = seconds;
        self
    }

    pub fn sync_secondary_stale_after_secs(mut self, seconds: u64) -> Self {
        self.config.sync.secondary_stale_after_secs = seconds;
        self
    }

    pub fn sync_spatial_radius_km(mut self, km: f64) -> Self {
        self.config.sync.spatial_radius_km = km;
        self
    }

    pub fn sync_location_change_threshold_km(mut self, km: f64) -> Self {
        self.config.sync.location_change_threshold_km = km;
        self
    }

    pub fn sync_spatial_cell_population(mut self, population: u32) -> Self {
        self.config.sync.spatial_cell_population = Some(population);
        self
    }

    // --- storage ---

    pub fn storage_database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    pub fn storage_staging_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.staging_dir = dir;
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_access_token(mut self, token: impl Into<String>) -> Self {
        self.config.remote.access_token = Some(token.into());
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.page_size, 40);
        assert_eq!(cfg.sync.device_capability, DeviceCapability::Standard);
        assert_eq!(cfg.sync.large_incident_page_multiple, 15);
        assert_eq!(cfg.sync.secondary_page_size, 300);
        assert_eq!(cfg.sync.commit_batch_size, 100);
        assert_eq!(cfg.sync.staging_max_age_secs, 3600);
        assert_eq!(cfg.sync.secondary_stale_after_secs, 1800);
        assert_eq!(cfg.sync.spatial_radius_km, 30.0);
        assert_eq!(cfg.sync.location_change_threshold_km, 10.0);
        assert!(cfg.sync.spatial_cell_population.is_none());
        assert!(cfg
            .storage
            .database_path
            .to_string_lossy()
            .ends_with("reliefsync.db"));
        assert!(cfg.remote.access_token.is_none());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    #[test]
    fn large_incident_threshold_uses_effective_page_size() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.large_incident_threshold(), 600);

        let limited = ConfigBuilder::new()
            .sync_device_capability(DeviceCapability::Limited)
            .build();
        assert_eq!(limited.sync.effective_page_size(), 20);
        assert_eq!(limited.sync.effective_secondary_page_size(), 150);
        assert_eq!(limited.sync.large_incident_threshold(), 300);
    }

    #[test]
    fn cell_population_defaults_to_page_size() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.cell_population(), 40);

        let cfg = ConfigBuilder::new().sync_spatial_cell_population(25).build();
        assert_eq!(cfg.sync.cell_population(), 25);
    }

    #[test]
    fn commit_batch_size_is_clamped() {
        let cfg = ConfigBuilder::new().sync_commit_batch_size(2).build();
        assert_eq!(cfg.sync.effective_commit_batch_size(), 10);
        let cfg = ConfigBuilder::new().sync_commit_batch_size(9000).build();
        assert_eq!(cfg.sync.effective_commit_batch_size(), 500);
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
sync:
  page_size: 60
  device_capability: limited
  commit_batch_size: 50
  spatial_radius_km: 12.5
storage:
  database_path: /tmp/relief.db
  staging_dir: /tmp/relief-staging
remote:
  base_url: https://relief.example.org
  access_token: "token-123"
logging:
  level: debug
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.sync.page_size, 60);
        assert_eq!(cfg.sync.device_capability, DeviceCapability::Limited);
        assert_eq!(cfg.sync.commit_batch_size, 50);
        assert_eq!(cfg.sync.spatial_radius_km, 12.5);
        // unspecified fields fall back to defaults
        assert_eq!(cfg.sync.secondary_page_size, 300);
        assert_eq!(cfg.storage.database_path, PathBuf::from("/tmp/relief.db"));
        assert_eq!(cfg.remote.base_url, "https://relief.example.org");
        assert_eq!(cfg.remote.access_token.as_deref(), Some("token-123"));
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_missing_file_errors() {
        let result = Config::load(Path::new("/nonexistent/reliefsync/config.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_or_default_falls_back() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.sync.page_size, 40);
    }

    // -- Validation --

    #[test]
    fn validate_collects_all_errors() {
        let cfg = ConfigBuilder::new()
            .sync_page_size(0)
            .sync_commit_batch_size(5)
            .sync_spatial_radius_km(-1.0)
            .remote_base_url("ftp://nowhere")
            .logging_level("loud")
            .build();
        let errors = cfg.validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"sync.page_size"));
        assert!(fields.contains(&"sync.commit_batch_size"));
        assert!(fields.contains(&"sync.spatial_radius_km"));
        assert!(fields.contains(&"remote.base_url"));
        assert!(fields.contains(&"logging.level"));
    }

    #[test]
    fn build_validated_rejects_invalid() {
        let result = ConfigBuilder::new().sync_secondary_page_size(1).build_validated();
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "sync.secondary_page_size");
        assert_eq!(
            errors[0].to_string(),
            "sync.secondary_page_size: must be at least 2"
        );
    }
}
