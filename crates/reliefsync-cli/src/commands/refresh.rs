//! Refresh command - Re-pull specific worksites in the full shape

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use reliefsync_core::domain::{IncidentId, NetworkId};
use reliefsync_core::ports::FixedLocation;
use reliefsync_sync::IncidentDataSyncer;

use super::{app_build_version, open_store, parse_incident, remote_source, CommandEnv};
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct RefreshCommand {
    /// Incident the worksites belong to
    #[arg(value_parser = parse_incident)]
    pub incident: IncidentId,

    /// Server ids of the worksites to refresh
    #[arg(required = true, value_parser = parse_network_id)]
    pub ids: Vec<NetworkId>,

    /// Access token (overrides remote.access_token)
    #[arg(long)]
    pub token: Option<String>,
}

fn parse_network_id(value: &str) -> Result<NetworkId, String> {
    let id = value
        .parse::<i64>()
        .map_err(|_| format!("'{value}' is not a number"))?;
    NetworkId::new(id).map_err(|e| e.to_string())
}

impl RefreshCommand {
    pub async fn execute(&self, env: &CommandEnv) -> Result<()> {
        let formatter = get_formatter(env.format);
        let config = env.load_config();

        let (_pool, store) = open_store(&config).await?;
        let remote = Arc::new(remote_source(&config, self.token.as_deref()));
        let syncer = IncidentDataSyncer::with_staging_dir(
            remote,
            store,
            config.storage.staging_dir.clone(),
            Arc::new(FixedLocation::unknown()),
            config.sync.clone(),
            app_build_version(),
        );

        let outcome = syncer
            .refresh_worksites(self.incident, &self.ids)
            .await
            .context("Refresh failed")?;

        if env.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "requested": self.ids.len(),
                "inserted": outcome.inserted,
                "updated": outcome.updated,
                "skipped": outcome.skipped,
            }));
        } else {
            formatter.success(&format!(
                "Refreshed {} of {} worksites",
                outcome.applied(),
                self.ids.len()
            ));
            if outcome.skipped > 0 {
                formatter.info(&format!(
                    "{} skipped (local edits not yet uploaded)",
                    outcome.skipped
                ));
            }
        }
        Ok(())
    }
}
