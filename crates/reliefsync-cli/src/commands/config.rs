//! Config command - View and manage ReliefSync configuration
//!
//! Provides the `reliefsync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use reliefsync_core::config::{Config, DeviceCapability};

use super::CommandEnv;
use crate::output::get_formatter;

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.page_size", "Worksites per page"),
    ("sync.device_capability", "limited|standard"),
    ("sync.large_incident_page_multiple", "Pages before a pull goes spatial"),
    ("sync.secondary_page_size", "Records per flags/form-data page"),
    ("sync.commit_batch_size", "Records per local transaction"),
    ("sync.staging_max_age_secs", "Seconds a staged page stays valid"),
    ("sync.secondary_stale_after_secs", "Seconds before secondary data is refreshed"),
    ("sync.spatial_radius_km", "Radius of spatial pulls"),
    ("sync.location_change_threshold_km", "Movement that restarts a spatial pull"),
    ("sync.spatial_cell_population", "Worksites per grid cell, or 'none'"),
    ("storage.database_path", "SQLite database file"),
    ("storage.staging_dir", "Directory for staged pages"),
    ("remote.base_url", "API root URL"),
    ("remote.access_token", "Bearer token, or 'none'"),
    ("logging.level", "trace|debug|info|warn|error"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.page_size")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, env: &CommandEnv) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(env),
            ConfigCommand::Set { key, value } => self.execute_set(env, key, value),
            ConfigCommand::Validate => self.execute_validate(env),
        }
    }

    fn execute_show(&self, env: &CommandEnv) -> Result<()> {
        let formatter = get_formatter(env.format);
        let mut config = env.load_config();
        if config.remote.access_token.is_some() {
            config.remote.access_token = Some("********".to_string());
        }

        if env.format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", env.config_path.display()));
            formatter.info("");
            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_set(&self, env: &CommandEnv, key: &str, value: &str) -> Result<()> {
        let formatter = get_formatter(env.format);
        let mut config = env.load_config();

        info!(key = %key, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if env.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {:<36} - {}", name, help));
                }
            }
            return Ok(());
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            if env.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "errors": messages,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{}': {}", key, messages.join("; ")));
            }
            return Ok(());
        }

        save_config(&config, &env.config_path)?;

        if env.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "config_path": env.config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {}", key));
            formatter.info(&format!("Saved to {}", env.config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, env: &CommandEnv) -> Result<()> {
        let formatter = get_formatter(env.format);
        let path = &env.config_path;

        let config = match Config::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                let message = if path.exists() {
                    format!("Failed to parse configuration: {}", e)
                } else {
                    "Configuration file not found. Using defaults.".to_string()
                };
                if env.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [message],
                    }));
                } else {
                    formatter.error(&message);
                    formatter.info(&format!("File: {}", path.display()));
                }
                return Ok(());
            }
        };

        let errors = config.validate();
        if env.format.is_json() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }
        Ok(())
    }
}

fn save_config(config: &Config, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    std::fs::write(path, yaml).context("Failed to write configuration file")?;
    Ok(())
}

fn optional(value: &str) -> Option<&str> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value)
    }
}

/// Apply a dot-notation key/value pair to a Config
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let sync = &mut config.sync;
    match key {
        "sync.page_size" => sync.page_size = value.parse().context("Expected a positive integer")?,
        "sync.device_capability" => {
            sync.device_capability = match value {
                "limited" => DeviceCapability::Limited,
                "standard" => DeviceCapability::Standard,
                other => anyhow::bail!("Expected 'limited' or 'standard', got '{}'", other),
            }
        }
        "sync.large_incident_page_multiple" => {
            sync.large_incident_page_multiple =
                value.parse().context("Expected a positive integer")?
        }
        "sync.secondary_page_size" => {
            sync.secondary_page_size = value.parse().context("Expected a positive integer")?
        }
        "sync.commit_batch_size" => {
            sync.commit_batch_size = value.parse().context("Expected a positive integer")?
        }
        "sync.staging_max_age_secs" => {
            sync.staging_max_age_secs = value.parse().context("Expected a number of seconds")?
        }
        "sync.secondary_stale_after_secs" => {
            sync.secondary_stale_after_secs =
                value.parse().context("Expected a number of seconds")?
        }
        "sync.spatial_radius_km" => {
            sync.spatial_radius_km = value.parse().context("Expected a distance in km")?
        }
        "sync.location_change_threshold_km" => {
            sync.location_change_threshold_km =
                value.parse().context("Expected a distance in km")?
        }
        "sync.spatial_cell_population" => {
            sync.spatial_cell_population = optional(value)
                .map(str::parse)
                .transpose()
                .context("Expected a positive integer or 'none'")?
        }
        "storage.database_path" => config.storage.database_path = PathBuf::from(value),
        "storage.staging_dir" => config.storage.staging_dir = PathBuf::from(value),
        "remote.base_url" => config.remote.base_url = value.trim_end_matches('/').to_string(),
        "remote.access_token" => config.remote.access_token = optional(value).map(str::to_string),
        "logging.level" => config.logging.level = value.to_string(),
        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }
    Ok(())
}
