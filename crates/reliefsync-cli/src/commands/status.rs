//! Status command - Show sync stats of an incident
//!
//! Provides the `reliefsync status <incident>` CLI command which lists, per
//! category, the current epoch's progress, the last successful pull and the
//! failed attempts since then. Spatial pulls also show their area.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;

use reliefsync_core::domain::{IncidentId, SyncStats};
use reliefsync_core::ports::IWorksiteRepository;

use super::{open_store, parse_incident, CommandEnv};
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Incident to show
    #[arg(value_parser = parse_incident)]
    pub incident: IncidentId,
}

impl StatusCommand {
    pub async fn execute(&self, env: &CommandEnv) -> Result<()> {
        let formatter = get_formatter(env.format);
        let config = env.load_config();

        if !config.storage.database_path.exists() {
            formatter.error("No database found. Run 'reliefsync sync <incident>' first.");
            return Ok(());
        }

        let (_pool, store) = open_store(&config).await?;
        let stats = store
            .list_sync_stats(self.incident)
            .await
            .context("Failed to load sync stats")?;
        let local_count = store
            .count_worksites(self.incident)
            .await
            .context("Failed to count local worksites")?;

        if env.format.is_json() {
            let json = serde_json::json!({
                "incident_id": self.incident,
                "local_worksites": local_count,
                "stats": stats,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!("Incident {} - {} local worksites", self.incident, local_count));
        if stats.is_empty() {
            formatter.info("Never synced");
            return Ok(());
        }

        for entry in &stats {
            formatter.info("");
            for line in describe(entry) {
                formatter.info(&line);
            }
        }
        Ok(())
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn describe(stats: &SyncStats) -> Vec<String> {
    let state = if stats.is_synced() { "synced" } else { "in progress" };
    let mut lines = vec![
        format!("[{}] {}", stats.category, state),
        format!("  paged:        {}/{}", stats.paged_count, stats.target_count),
        format!("  last success: {}", format_time(stats.successful_sync)),
    ];
    if stats.attempted_counter > 0 {
        lines.push(format!(
            "  failed tries: {} (last {})",
            stats.attempted_counter,
            format_time(stats.attempted_sync)
        ));
    }
    if let Some(bounded) = stats.bounded {
        lines.push(format!(
            "  area:         {:.4},{:.4} r={} km, cell {}, fetched {}",
            bounded.center.latitude,
            bounded.center.longitude,
            bounded.radius_km,
            bounded.cell_index,
            bounded.fetched_count
        ));
    }
    lines
}
