use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::model::EntityKind;
use crate::store::lock;

const MAPPING_FILE_VERSION: u32 = 1;

/// What happened to a source entity during migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    /// Matched an entity already in the destination; nothing was created.
    Existing,
    /// A new destination entity was created for it.
    Created,
}

impl std::fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Existing => write!(f, "existing"),
            Self::Created => write!(f, "created"),
        }
    }
}

/// Flattened, serialisable view of one source -> destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub kind: EntityKind,
    pub source_id: u64,
    pub destination_id: u64,
    pub status: MappingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Target {
    destination_id: u64,
    status: MappingStatus,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MappingCounts {
    pub existing: usize,
    pub created: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    version: u32,
    entries: Vec<MappingEntry>,
}

/// Source-ID -> destination-ID table with a status per pair.
///
/// Keys are scoped by entity kind: suite 10 and section 10 are distinct
/// entries. Within one kind there is at most one destination per source ID
/// and a later `record` replaces an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingIndex {
    entries: BTreeMap<(EntityKind, u64), Target>,
}

impl MappingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pair, returning the previous destination if any.
    pub fn record(
        &mut self,
        kind: EntityKind,
        source_id: u64,
        destination_id: u64,
        status: MappingStatus,
    ) -> Option<u64> {
        self.entries
            .insert(
                (kind, source_id),
                Target {
                    destination_id,
                    status,
                },
            )
            .map(|prev| prev.destination_id)
    }

    pub fn lookup(&self, kind: EntityKind, source_id: u64) -> Option<u64> {
        self.entries
            .get(&(kind, source_id))
            .map(|t| t.destination_id)
    }

    pub fn get(&self, kind: EntityKind, source_id: u64) -> Option<MappingEntry> {
        self.entries.get(&(kind, source_id)).map(|t| MappingEntry {
            kind,
            source_id,
            destination_id: t.destination_id,
            status: t.status,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only flattened copy, ordered by kind then source ID.
    pub fn snapshot(&self) -> Vec<MappingEntry> {
        self.entries
            .iter()
            .map(|(&(kind, source_id), t)| MappingEntry {
                kind,
                source_id,
                destination_id: t.destination_id,
                status: t.status,
            })
            .collect()
    }

    pub fn counts(&self) -> MappingCounts {
        self.counts_where(|_| true)
    }

    pub fn counts_for(&self, kind: EntityKind) -> MappingCounts {
        self.counts_where(|k| k == kind)
    }

    fn counts_where(&self, keep: impl Fn(EntityKind) -> bool) -> MappingCounts {
        let mut counts = MappingCounts::default();
        for (&(kind, _), t) in &self.entries {
            if !keep(kind) {
                continue;
            }
            match t.status {
                MappingStatus::Existing => counts.existing += 1,
                MappingStatus::Created => counts.created += 1,
            }
        }
        counts
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let file: MappingFile = serde_json::from_str(&data)
            .map_err(|e| SyncError::MappingCorrupt(path.display().to_string(), e.to_string()))?;
        if file.version != MAPPING_FILE_VERSION {
            return Err(SyncError::MappingCorrupt(
                path.display().to_string(),
                format!(
                    "unsupported version {} (expected {MAPPING_FILE_VERSION})",
                    file.version
                ),
            ));
        }

        let mut index = Self::new();
        for entry in file.entries {
            index.record(
                entry.kind,
                entry.source_id,
                entry.destination_id,
                entry.status,
            );
        }
        Ok(index)
    }

    /// Write the index as indented JSON, staging to a sibling temp file and
    /// renaming over `path` so readers never see a partial write.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let lock_path = lock::lock_path_for(path);
        let lock_file = lock::acquire_lock(&lock_path)?;
        let written = self.write_staged(path);
        let released = lock::release_lock(lock_file);
        let _ = fs::remove_file(&lock_path);
        written.and(released)
    }

    fn write_staged(&self, path: &Path) -> Result<()> {
        let file = MappingFile {
            version: MAPPING_FILE_VERSION,
            entries: self.snapshot(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let staging = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        if let Err(err) = fs::write(&staging, json) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        Ok(())
    }
}
