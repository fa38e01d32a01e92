//! Claims command - Count claims not yet uploaded
//!
//! Shows how many work types an organization claimed (and closed) on this
//! device since the last upload, so a volunteer knows what is pending before
//! signing out.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use reliefsync_cache::SqliteWorksiteChangeRepository;
use reliefsync_core::domain::{IncidentId, OrganizationId};
use reliefsync_core::usecases::CountUnsyncedClaimsUseCase;

use super::{app_build_version, open_database, parse_incident, CommandEnv};
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct ClaimsCommand {
    /// Incident to inspect
    #[arg(value_parser = parse_incident)]
    pub incident: IncidentId,

    /// Organization whose claims are counted
    #[arg(long)]
    pub org: i64,
}

impl ClaimsCommand {
    pub async fn execute(&self, env: &CommandEnv) -> Result<()> {
        let formatter = get_formatter(env.format);
        let config = env.load_config();
        let org_id = OrganizationId::new(self.org).context("Invalid organization id")?;

        if !config.storage.database_path.exists() {
            formatter.error("No database found. Run 'reliefsync sync <incident>' first.");
            return Ok(());
        }

        let pool = open_database(&config.storage.database_path).await?;
        let changes = Arc::new(SqliteWorksiteChangeRepository::new(
            pool.pool().clone(),
            app_build_version(),
        ));
        let counts = CountUnsyncedClaimsUseCase::new(changes)
            .execute(org_id, self.incident, &HashSet::new())
            .await?;

        if env.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "incident_id": self.incident,
                "org_id": self.org,
                "claims": counts.claim_count,
                "closes": counts.close_count,
            }));
        } else if counts.claim_count == 0 && counts.close_count == 0 {
            formatter.success("No unsynced claims");
        } else {
            formatter.warn(&format!(
                "{} unsynced claims ({} closed) for organization {}",
                counts.claim_count, counts.close_count, org_id
            ));
        }
        Ok(())
    }
}
