//! Sync command - Pull an incident into the local store
//!
//! Provides the `reliefsync sync <incident>` CLI command which:
//! 1. Loads configuration and opens the database
//! 2. Creates the adapters (HTTP remote, SQLite store, staging directory)
//! 3. Runs the pull pipeline, printing progress as it goes
//! 4. Cancels cleanly on Ctrl-C; the next run resumes where this one stopped

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use reliefsync_core::domain::{Coordinates, IncidentId};
use reliefsync_core::ports::{FixedLocation, ILocationProvider};
use reliefsync_sync::{IncidentDataSyncer, SyncOutcome, SyncReport};

use super::{app_build_version, open_store, parse_incident, remote_source, CommandEnv};
use crate::output::{get_formatter, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Incident to pull
    #[arg(value_parser = parse_incident)]
    pub incident: IncidentId,

    /// Device latitude, enables spatial pulls of large incidents
    #[arg(long, requires = "longitude", allow_negative_numbers = true)]
    pub latitude: Option<f64>,

    /// Device longitude
    #[arg(long, requires = "latitude", allow_negative_numbers = true)]
    pub longitude: Option<f64>,

    /// Access token (overrides remote.access_token)
    #[arg(long)]
    pub token: Option<String>,
}

impl SyncCommand {
    fn location(&self) -> Result<FixedLocation> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                let center = Coordinates::new(lat, lon).context("Invalid device location")?;
                Ok(FixedLocation::new(center))
            }
            _ => Ok(FixedLocation::unknown()),
        }
    }

    pub async fn execute(&self, env: &CommandEnv) -> Result<()> {
        let formatter = get_formatter(env.format);
        let config = env.load_config();

        let location: Arc<dyn ILocationProvider> = Arc::new(self.location()?);
        let (_pool, store) = open_store(&config).await?;
        if self.token.is_none() && config.remote.access_token.is_none() {
            formatter.warn("No access token configured; requests are unauthenticated");
        }
        let remote = Arc::new(remote_source(&config, self.token.as_deref()));

        let syncer = IncidentDataSyncer::with_staging_dir(
            remote,
            store,
            config.storage.staging_dir.clone(),
            location,
            config.sync.clone(),
            app_build_version(),
        );

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling sync");
                on_interrupt.cancel();
            }
        });

        let mut progress = syncer.subscribe();
        let progress_formatter = get_formatter(env.format);
        let progress_task = tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let snapshot = progress.borrow_and_update().clone();
                progress_formatter.progress(&snapshot);
            }
        });

        formatter.info(&format!("Syncing incident {}...", self.incident));
        let result = syncer.sync(self.incident, &cancel).await;
        progress_task.abort();

        match result {
            Ok(report) => {
                print_report(&report, &*formatter, env.format.is_json())?;
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                formatter.warn("Sync cancelled; the next run resumes where this one stopped");
                Ok(())
            }
            Err(e) => Err(e).context("Sync failed"),
        }
    }
}

fn print_report(report: &SyncReport, formatter: &dyn OutputFormatter, json: bool) -> Result<()> {
    if json {
        let mut value = serde_json::to_value(report).context("Failed to serialize report")?;
        value["applied"] = report.applied().into();
        value["skipped"] = report.skipped().into();
        value["teams_applied"] = report.teams.map(|t| t.applied()).into();
        formatter.print_json(&value);
        return Ok(());
    }

    formatter.success(&format!(
        "Incident {}: {} ({} ms)",
        report.incident_id,
        report.outcome.label(),
        report.duration_ms
    ));
    for stage in &report.stages {
        formatter.info(&format!(
            "{:<10} {:<11} pulled {:>6}  applied {:>6}  skipped {:>4}",
            stage.category.as_str(),
            stage.outcome.label(),
            stage.pulled,
            stage.commit.applied(),
            stage.commit.skipped
        ));
    }
    if let Some(teams) = report.teams {
        formatter.info(&format!("teams      applied {}", teams.applied()));
    }

    match &report.outcome {
        SyncOutcome::Deferred { reason } => formatter.warn(reason),
        SyncOutcome::Incomplete { reason } => {
            formatter.warn(&format!("Stopped early: {reason}. Run sync again to resume."))
        }
        _ => {}
    }
    Ok(())
}
