use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::ValueEnum;

use crate::client::TestRailApi;
use crate::config::Config;
use crate::error::Result;
use crate::logging::LogGuard;
use crate::migrate::{Concurrency, Confirm, Locations, MigrationContext, StageOptions};
use crate::model::EntityKind;
use crate::output::{self, Format, RunReport};
use crate::store::mapping::MappingIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum Target {
    Suites,
    Sections,
    SharedSteps,
    Cases,
    Full,
}

impl Target {
    /// The single entity type, or `None` for the full chain.
    pub fn kind(self) -> Option<EntityKind> {
        match self {
            Self::Suites => Some(EntityKind::Suite),
            Self::Sections => Some(EntityKind::Section),
            Self::SharedSteps => Some(EntityKind::SharedStep),
            Self::Cases => Some(EntityKind::Case),
            Self::Full => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub locations: Locations,
    pub dry_run: bool,
    pub yes: bool,
    pub export: bool,
    /// Mapping file to preload and, after a real run, write back.
    pub mapping: Option<PathBuf>,
}

/// Interactive y/N prompt on stderr, answered on stdin.
pub struct StdinConfirm {
    locations: Locations,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, kind: EntityKind, novel: usize) -> Result<bool> {
        let mut stderr = io::stderr();
        write!(
            stderr,
            "Import {novel} {kind} into project {} suite {}? [y/N] ",
            self.locations.dst_project, self.locations.dst_suite
        )?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

pub fn run(
    client: &dyn TestRailApi,
    config: &Config,
    log: LogGuard,
    target: Target,
    args: MigrateArgs,
    format: Format,
) -> Result<()> {
    let confirm = StdinConfirm {
        locations: args.locations,
    };
    let report = execute(client, config, log, target, args, &confirm)?;
    output::print_run_report(&report, format)
}

/// Run `target` and return the report without printing it.
///
/// When a mapping file is given and the run is not a dry run, the mapping
/// is written back even if a stage failed, so a later invocation can resume.
pub fn execute(
    client: &dyn TestRailApi,
    config: &Config,
    log: LogGuard,
    target: Target,
    args: MigrateArgs,
    confirm: &dyn Confirm,
) -> Result<RunReport> {
    let preload = match args.mapping.as_deref() {
        Some(path) if path.exists() => MappingIndex::load(path)?,
        _ => MappingIndex::new(),
    };
    let log_file = log.path().map(|p| p.display().to_string());

    let mut ctx = MigrationContext::new(client, args.locations)
        .with_compare_field(config.compare_field.clone())
        .with_concurrency(Concurrency::from(config.concurrency))
        .with_mapping(preload)
        .with_log(log);

    let options = StageOptions {
        dry_run: args.dry_run,
        auto_approve: args.yes,
        export_snapshots: args.export,
        export_mapping: args.export,
        log_dir: config.log_dir.clone(),
    };

    let outcome = match target.kind() {
        Some(kind) => ctx.migrate(kind, &options, confirm).map(|r| vec![r]),
        None => ctx.migrate_full(&options, confirm),
    };

    let imported_total = ctx.imported();
    let mapping = ctx.close()?;

    let mapping_file = match args.mapping {
        Some(path) if !args.dry_run => {
            mapping.save(&path)?;
            Some(path.display().to_string())
        }
        _ => None,
    };

    Ok(RunReport {
        dry_run: args.dry_run,
        stages: outcome?,
        imported_total,
        mapping_entries: mapping.len(),
        mapping_file,
        log_file,
    })
}
