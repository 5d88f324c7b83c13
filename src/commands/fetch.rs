use crate::client::TestRailApi;
use crate::config::Config;
use crate::error::Result;
use crate::logging::LogGuard;
use crate::migrate::{Locations, MigrationContext, StageOptions};
use crate::model::EntityKind;
use crate::output::{self, Format, RunReport};

/// Fetch and filter one entity type, writing `all` and `filtered`
/// snapshots to the log directory. Never creates anything.
pub fn run(
    client: &dyn TestRailApi,
    config: &Config,
    log: LogGuard,
    kind: EntityKind,
    locations: Locations,
    format: Format,
) -> Result<()> {
    let log_file = log.path().map(|p| p.display().to_string());
    let mut ctx = MigrationContext::new(client, locations)
        .with_compare_field(config.compare_field.clone())
        .with_log(log);

    let stage = ctx.preview(
        kind,
        &StageOptions {
            dry_run: true,
            auto_approve: true,
            export_snapshots: true,
            export_mapping: false,
            log_dir: config.log_dir.clone(),
        },
    )?;
    let mapping = ctx.close()?;

    output::print_run_report(
        &RunReport {
            dry_run: true,
            stages: vec![stage],
            imported_total: 0,
            mapping_entries: mapping.len(),
            mapping_file: None,
            log_file,
        },
        format,
    )
}
