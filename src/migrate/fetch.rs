use std::collections::HashSet;

use tracing::info;

use crate::client::TestRailApi;
use crate::error::{Result, Side, SyncError};
use crate::migrate::Locations;
use crate::model::{Case, EntityKind, Section, SharedStep, Snapshot, Suite};

/// Both sides of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub source: Vec<T>,
    pub destination: Vec<T>,
}

/// Shared steps plus the IDs of every case in the source suite, which the
/// usage filter needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedStepData {
    pub steps: Fetched<SharedStep>,
    pub source_case_ids: HashSet<u64>,
}

fn pair<T: Snapshot>(
    source: impl FnOnce() -> Result<Vec<T>>,
    destination: impl FnOnce() -> Result<Vec<T>>,
) -> Result<Fetched<T>> {
    let source = source().map_err(|e| SyncError::fetch(T::KIND, Side::Source, e))?;
    let destination =
        destination().map_err(|e| SyncError::fetch(T::KIND, Side::Destination, e))?;
    info!(
        kind = %T::KIND,
        source = source.len(),
        destination = destination.len(),
        "fetched"
    );
    Ok(Fetched {
        source,
        destination,
    })
}

pub fn fetch_suites(client: &dyn TestRailApi, loc: &Locations) -> Result<Fetched<Suite>> {
    pair(
        || client.get_suites(loc.src_project),
        || client.get_suites(loc.dst_project),
    )
}

pub fn fetch_sections(client: &dyn TestRailApi, loc: &Locations) -> Result<Fetched<Section>> {
    pair(
        || client.get_sections(loc.src_project, loc.src_suite),
        || client.get_sections(loc.dst_project, loc.dst_suite),
    )
}

pub fn fetch_shared_steps(client: &dyn TestRailApi, loc: &Locations) -> Result<SharedStepData> {
    let steps = pair(
        || client.get_shared_steps(loc.src_project),
        || client.get_shared_steps(loc.dst_project),
    )?;
    let source_case_ids = client
        .get_cases(loc.src_project, loc.src_suite)
        .map_err(|e| SyncError::fetch(EntityKind::Case, Side::Source, e))?
        .iter()
        .map(|case| case.id)
        .collect();
    Ok(SharedStepData {
        steps,
        source_case_ids,
    })
}

pub fn fetch_cases(client: &dyn TestRailApi, loc: &Locations) -> Result<Fetched<Case>> {
    pair(
        || client.get_cases(loc.src_project, loc.src_suite),
        || client.get_cases(loc.dst_project, loc.dst_suite),
    )
}
