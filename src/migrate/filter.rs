use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, SyncError};
use crate::migrate::fetch::{Fetched, SharedStepData};
use crate::model::{SharedStep, Snapshot};
use crate::store::mapping::{MappingIndex, MappingStatus};

/// Deduplication key: trimmed and lower-cased, for every entity type.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Novel shared steps, with the count dropped by the usage filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedStepCandidates {
    pub novel: Vec<SharedStep>,
    pub in_use: usize,
}

/// Split `fetched.source` into duplicates and novel items.
///
/// Every source item whose key matches a destination item is recorded in
/// `mapping` as `existing` and dropped. When several destination items share
/// a key the first one wins. A source item without the comparison field is
/// a filter error; destination items without it are simply not indexed.
pub fn filter_existing<T: Snapshot>(
    fetched: Fetched<T>,
    field: &str,
    mapping: &mut MappingIndex,
) -> Result<Vec<T>> {
    let mut by_key: HashMap<String, u64> = HashMap::with_capacity(fetched.destination.len());
    for item in &fetched.destination {
        if let Some(value) = item.field(field) {
            by_key.entry(normalize_key(&value)).or_insert(item.id());
        }
    }

    let mut keyed = Vec::with_capacity(fetched.source.len());
    for item in fetched.source {
        let Some(value) = item.field(field) else {
            return Err(SyncError::Filter(
                T::KIND,
                format!(
                    "source item {} has no comparison field `{field}`",
                    item.id()
                ),
            ));
        };
        keyed.push((normalize_key(&value), item));
    }

    // Nothing is recorded until every source item has a key.
    let mut novel = Vec::new();
    for (key, item) in keyed {
        match by_key.get(&key) {
            Some(&destination_id) => {
                debug!(
                    kind = %T::KIND,
                    source_id = item.id(),
                    destination_id,
                    "already present in destination"
                );
                mapping.record(T::KIND, item.id(), destination_id, MappingStatus::Existing);
            }
            None => novel.push(item),
        }
    }

    Ok(novel)
}

/// Usage filter, then deduplication. A shared step referenced by any case
/// still in the source suite is never a candidate, duplicate or not.
pub fn filter_shared_steps(
    data: SharedStepData,
    field: &str,
    mapping: &mut MappingIndex,
) -> Result<SharedStepCandidates> {
    let SharedStepData {
        steps,
        source_case_ids,
    } = data;

    let total = steps.source.len();
    let unused: Vec<SharedStep> = steps
        .source
        .into_iter()
        .filter(|step| {
            let used = step.case_ids.iter().any(|id| source_case_ids.contains(id));
            if used {
                debug!(source_id = step.id, title = %step.title, "shared step still used by a source case");
            }
            !used
        })
        .collect();
    let in_use = total - unused.len();

    let novel = filter_existing(
        Fetched {
            source: unused,
            destination: steps.destination,
        },
        field,
        mapping,
    )?;

    Ok(SharedStepCandidates { novel, in_use })
}
