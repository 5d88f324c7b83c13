//! Cross-project migration engine: fetch, deduplicate, import, export.
//!
//! Each entity type runs the same linear stage sequence. The only state
//! carried between stages and between entity types is the [`MappingIndex`],
//! which stage functions receive explicitly.

pub mod export;
pub mod fetch;
pub mod filter;
pub mod import;
pub mod orchestrate;
pub mod pool;

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::client::TestRailApi;
use crate::error::Result;
use crate::logging::LogGuard;
use crate::model::EntityKind;
use crate::store::mapping::{MappingEntry, MappingIndex};

pub use orchestrate::{AutoApprove, Confirm};
pub use pool::Concurrency;

/// Where entities are read from and written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Locations {
    pub src_project: u64,
    pub src_suite: u64,
    pub dst_project: u64,
    pub dst_suite: u64,
    /// Fallback section for cases whose source section has no mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_section: Option<u64>,
}

/// Per-run switches for the stage sequence.
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    pub dry_run: bool,
    pub auto_approve: bool,
    /// Write `all`/`filtered` snapshots of each stage's items.
    pub export_snapshots: bool,
    /// Write the mapping index after each import.
    pub export_mapping: bool,
    pub log_dir: PathBuf,
}

/// A single create call that failed; siblings are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub source_id: u64,
    pub label: String,
    pub message: String,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}': {}", self.source_id, self.label, self.message)
    }
}

/// Outcome of one entity-type stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub kind: EntityKind,
    pub dry_run: bool,
    pub source_count: usize,
    pub destination_count: usize,
    /// Source items matched to an existing destination item.
    pub existing: usize,
    /// Shared steps skipped because a source case still uses them.
    #[serde(skip_serializing_if = "is_zero")]
    pub in_use: usize,
    pub novel: usize,
    pub imported: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<ItemFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exported: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_file: Option<String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl StageReport {
    fn new(kind: EntityKind, dry_run: bool) -> Self {
        Self {
            kind,
            dry_run,
            source_count: 0,
            destination_count: 0,
            existing: 0,
            in_use: 0,
            novel: 0,
            imported: 0,
            created_ids: Vec::new(),
            failed: Vec::new(),
            exported: Vec::new(),
            mapping_file: None,
        }
    }
}

/// Aggregate root for one CLI invocation.
pub struct MigrationContext<'a> {
    client: &'a dyn TestRailApi,
    locations: Locations,
    compare_field: String,
    concurrency: Concurrency,
    imported: usize,
    mapping: MappingIndex,
    log: LogGuard,
}

impl<'a> MigrationContext<'a> {
    pub fn new(client: &'a dyn TestRailApi, locations: Locations) -> Self {
        Self {
            client,
            locations,
            compare_field: "title".into(),
            concurrency: Concurrency::default(),
            imported: 0,
            mapping: MappingIndex::new(),
            log: LogGuard::disabled(),
        }
    }

    pub fn with_compare_field(mut self, field: impl Into<String>) -> Self {
        self.compare_field = field.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Seed the context with a mapping from an earlier run.
    pub fn with_mapping(mut self, mapping: MappingIndex) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_log(mut self, log: LogGuard) -> Self {
        self.log = log;
        self
    }

    /// Items created so far across every stage of this context.
    pub fn imported(&self) -> usize {
        self.imported
    }

    /// Flattened read-only copy of the mapping index.
    pub fn mapping(&self) -> Vec<MappingEntry> {
        self.mapping.snapshot()
    }

    pub fn mapping_index(&self) -> &MappingIndex {
        &self.mapping
    }

    /// Finish the run: flush the log sink and hand back the final mapping.
    pub fn close(mut self) -> Result<MappingIndex> {
        info!(
            imported = self.imported,
            mapped = self.mapping.len(),
            "migration context closed"
        );
        self.log.flush()?;
        Ok(std::mem::take(&mut self.mapping))
    }
}
