use tracing::info;

use crate::error::{Result, SyncError};
use crate::migrate::export;
use crate::migrate::fetch::{self, Fetched, SharedStepData};
use crate::migrate::filter::{self, SharedStepCandidates};
use crate::migrate::import::{self, ImportOptions, ImportReport};
use crate::migrate::{MigrationContext, StageOptions, StageReport};
use crate::model::{Case, EntityKind, Section, SharedStep, Snapshot, Suite};

/// Gate between filtering and importing.
pub trait Confirm {
    /// Return `Ok(true)` to import `novel` items of `kind`.
    fn confirm(&self, kind: EntityKind, novel: usize) -> Result<bool>;
}

/// Approves every stage without asking.
pub struct AutoApprove;

impl Confirm for AutoApprove {
    fn confirm(&self, _kind: EntityKind, _novel: usize) -> Result<bool> {
        Ok(true)
    }
}

impl MigrationContext<'_> {
    pub fn fetch_suites(&self) -> Result<Fetched<Suite>> {
        fetch::fetch_suites(self.client, &self.locations)
    }

    pub fn fetch_sections(&self) -> Result<Fetched<Section>> {
        fetch::fetch_sections(self.client, &self.locations)
    }

    pub fn fetch_shared_steps(&self) -> Result<SharedStepData> {
        fetch::fetch_shared_steps(self.client, &self.locations)
    }

    pub fn fetch_cases(&self) -> Result<Fetched<Case>> {
        fetch::fetch_cases(self.client, &self.locations)
    }

    pub fn filter_suites(&mut self, fetched: Fetched<Suite>) -> Result<Vec<Suite>> {
        filter::filter_existing(fetched, &self.compare_field, &mut self.mapping)
    }

    pub fn filter_sections(&mut self, fetched: Fetched<Section>) -> Result<Vec<Section>> {
        filter::filter_existing(fetched, &self.compare_field, &mut self.mapping)
    }

    pub fn filter_shared_steps(&mut self, data: SharedStepData) -> Result<SharedStepCandidates> {
        filter::filter_shared_steps(data, &self.compare_field, &mut self.mapping)
    }

    pub fn filter_cases(&mut self, fetched: Fetched<Case>) -> Result<Vec<Case>> {
        filter::filter_existing(fetched, &self.compare_field, &mut self.mapping)
    }

    fn import_options(&self, dry_run: bool) -> ImportOptions {
        ImportOptions {
            dry_run,
            concurrency: self.concurrency,
        }
    }

    pub fn import_suites(&mut self, novel: &[Suite], dry_run: bool) -> ImportReport {
        let options = self.import_options(dry_run);
        let report =
            import::import_suites(self.client, &self.locations, novel, &mut self.mapping, options);
        self.imported += report.imported;
        report
    }

    pub fn import_sections(&mut self, novel: &[Section], dry_run: bool) -> ImportReport {
        let options = self.import_options(dry_run);
        let report =
            import::import_sections(self.client, &self.locations, novel, &mut self.mapping, options);
        self.imported += report.imported;
        report
    }

    pub fn import_shared_steps(&mut self, novel: &[SharedStep], dry_run: bool) -> ImportReport {
        let options = self.import_options(dry_run);
        let report = import::import_shared_steps(
            self.client,
            &self.locations,
            novel,
            &mut self.mapping,
            options,
        );
        self.imported += report.imported;
        report
    }

    pub fn import_cases(&mut self, novel: &[Case], dry_run: bool) -> ImportReport {
        let options = self.import_options(dry_run);
        let report =
            import::import_cases(self.client, &self.locations, novel, &self.mapping, options);
        self.imported += report.imported;
        report
    }

    pub fn export_mapping(&self, dir: &std::path::Path) -> Result<Option<std::path::PathBuf>> {
        export::export_mapping(&self.mapping, dir)
    }

    /// Fetch, filter and snapshot one entity type without importing.
    pub fn preview(&mut self, kind: EntityKind, options: &StageOptions) -> Result<StageReport> {
        let options = StageOptions {
            dry_run: true,
            ..options.clone()
        };
        self.migrate(kind, &options, &AutoApprove)
    }

    pub fn migrate(
        &mut self,
        kind: EntityKind,
        options: &StageOptions,
        confirm: &dyn Confirm,
    ) -> Result<StageReport> {
        match kind {
            EntityKind::Suite => self.migrate_suites(options, confirm),
            EntityKind::Section => self.migrate_sections(options, confirm),
            EntityKind::SharedStep => self.migrate_shared_steps(options, confirm),
            EntityKind::Case => self.migrate_cases(options, confirm),
        }
    }

    pub fn migrate_suites(
        &mut self,
        options: &StageOptions,
        confirm: &dyn Confirm,
    ) -> Result<StageReport> {
        let fetched = self.fetch_suites()?;
        let report = begin(&fetched.source, fetched.destination.len(), options)?;
        let novel = self.filter_suites(fetched)?;
        self.finish(report, novel, 0, options, confirm, |ctx, items, dry_run| {
            ctx.import_suites(items, dry_run)
        })
    }

    pub fn migrate_sections(
        &mut self,
        options: &StageOptions,
        confirm: &dyn Confirm,
    ) -> Result<StageReport> {
        let fetched = self.fetch_sections()?;
        let report = begin(&fetched.source, fetched.destination.len(), options)?;
        let novel = self.filter_sections(fetched)?;
        self.finish(report, novel, 0, options, confirm, |ctx, items, dry_run| {
            ctx.import_sections(items, dry_run)
        })
    }

    pub fn migrate_shared_steps(
        &mut self,
        options: &StageOptions,
        confirm: &dyn Confirm,
    ) -> Result<StageReport> {
        let data = self.fetch_shared_steps()?;
        let report = begin(&data.steps.source, data.steps.destination.len(), options)?;
        let SharedStepCandidates { novel, in_use } = self.filter_shared_steps(data)?;
        self.finish(report, novel, in_use, options, confirm, |ctx, items, dry_run| {
            ctx.import_shared_steps(items, dry_run)
        })
    }

    pub fn migrate_cases(
        &mut self,
        options: &StageOptions,
        confirm: &dyn Confirm,
    ) -> Result<StageReport> {
        let fetched = self.fetch_cases()?;
        let report = begin(&fetched.source, fetched.destination.len(), options)?;
        let novel = self.filter_cases(fetched)?;
        self.finish(report, novel, 0, options, confirm, |ctx, items, dry_run| {
            ctx.import_cases(items, dry_run)
        })
    }

    /// Suites, sections, shared steps, then cases. The first stage error
    /// ends the chain; completed stages are not rolled back.
    pub fn migrate_full(
        &mut self,
        options: &StageOptions,
        confirm: &dyn Confirm,
    ) -> Result<Vec<StageReport>> {
        let mut reports = Vec::with_capacity(EntityKind::FULL_ORDER.len());
        for kind in EntityKind::FULL_ORDER {
            reports.push(self.migrate(kind, options, confirm)?);
        }
        Ok(reports)
    }

    /// Shared tail of every stage: report counts, snapshot the novel list,
    /// then stop for dry-run, ask for confirmation, import, and persist the
    /// mapping.
    fn finish<T: Snapshot>(
        &mut self,
        mut report: StageReport,
        novel: Vec<T>,
        in_use: usize,
        options: &StageOptions,
        confirm: &dyn Confirm,
        import: impl FnOnce(&mut Self, &[T], bool) -> ImportReport,
    ) -> Result<StageReport> {
        report.in_use = in_use;
        report.novel = novel.len();
        report.existing = report.source_count - in_use - novel.len();

        if options.export_snapshots
            && let Some(path) = export::export_items(T::KIND, &novel, true, &options.log_dir)?
        {
            report.exported.push(path.display().to_string());
        }

        info!(
            kind = %T::KIND,
            source = report.source_count,
            existing = report.existing,
            in_use,
            novel = report.novel,
            dry_run = options.dry_run,
            "filtered"
        );

        if options.dry_run {
            return Ok(report);
        }

        if !novel.is_empty() && !options.auto_approve && !confirm.confirm(T::KIND, novel.len())? {
            return Err(SyncError::Aborted(T::KIND));
        }

        let imported = import(&mut *self, &novel, false);
        report.imported = imported.imported;
        report.created_ids = imported.created_ids;
        report.failed = imported.failed;

        if options.export_mapping
            && let Some(path) = self.export_mapping(&options.log_dir)?
        {
            report.mapping_file = Some(path.display().to_string());
        }

        Ok(report)
    }
}

/// Start a stage report and snapshot the full source list.
fn begin<T: Snapshot>(
    source: &[T],
    destination_count: usize,
    options: &StageOptions,
) -> Result<StageReport> {
    let mut report = StageReport::new(T::KIND, options.dry_run);
    report.source_count = source.len();
    report.destination_count = destination_count;
    if options.export_snapshots
        && let Some(path) = export::export_items(T::KIND, source, false, &options.log_dir)?
    {
        report.exported.push(path.display().to_string());
    }
    Ok(report)
}
