use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::model::EntityKind;
use crate::store::mapping::MappingIndex;

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// File name for an entity snapshot: `<kind>_<all|filtered>_<timestamp>.json`.
pub fn snapshot_file_name(kind: EntityKind, filtered: bool, stamp: &str) -> String {
    let tag = if filtered { "filtered" } else { "all" };
    format!("{}_{tag}_{stamp}.json", kind.stem())
}

/// Write `items` as indented JSON into `dir`. Empty collections write
/// nothing and return `None`.
pub fn export_items<T: Serialize>(
    kind: EntityKind,
    items: &[T],
    filtered: bool,
    dir: &Path,
) -> Result<Option<PathBuf>> {
    if items.is_empty() {
        return Ok(None);
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(kind, filtered, &timestamp()));
    fs::write(&path, serde_json::to_string_pretty(items)?)?;
    info!(%kind, count = items.len(), path = %path.display(), "exported snapshot");
    Ok(Some(path))
}

/// Persist the mapping index as `mapping_<timestamp>.json` in `dir`.
pub fn export_mapping(mapping: &MappingIndex, dir: &Path) -> Result<Option<PathBuf>> {
    if mapping.is_empty() {
        return Ok(None);
    }
    let path = dir.join(format!("mapping_{}.json", timestamp()));
    mapping.save(&path)?;
    info!(entries = mapping.len(), path = %path.display(), "exported mapping");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Suite;
    use crate::store::mapping::MappingStatus;
    use tempfile::tempdir;

    #[test]
    fn file_names_carry_kind_tag_and_stamp() {
        assert_eq!(
            snapshot_file_name(EntityKind::SharedStep, true, "20260101_120000"),
            "shared_steps_filtered_20260101_120000.json"
        );
        assert_eq!(
            snapshot_file_name(EntityKind::Case, false, "20260101_120000"),
            "cases_all_20260101_120000.json"
        );
    }

    #[test]
    fn empty_collections_are_skipped() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("logs");
        let none: Vec<Suite> = Vec::new();
        assert_eq!(export_items(EntityKind::Suite, &none, false, &out).unwrap(), None);
        assert_eq!(export_mapping(&MappingIndex::new(), &out).unwrap(), None);
        assert!(!out.exists());
    }

    #[test]
    fn snapshot_is_indented_json_array() {
        let dir = tempdir().unwrap();
        let suites = vec![Suite {
            id: 10,
            name: "Regression".into(),
            description: None,
            extra: Default::default(),
        }];
        let path = export_items(EntityKind::Suite, &suites, true, dir.path())
            .unwrap()
            .unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  {"));
        let parsed: Vec<Suite> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, suites);
    }

    #[test]
    fn mapping_export_round_trips_through_loader() {
        let dir = tempdir().unwrap();
        let mut mapping = MappingIndex::new();
        mapping.record(EntityKind::Suite, 10, 200, MappingStatus::Existing);
        let path = export_mapping(&mapping, dir.path()).unwrap().unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("mapping_"));
        assert_eq!(MappingIndex::load(&path).unwrap(), mapping);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn unwritable_directory_surfaces_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let suites = vec![Suite {
            id: 1,
            name: "s".into(),
            description: None,
            extra: Default::default(),
        }];
        assert!(export_items(EntityKind::Suite, &suites, false, &blocker.join("sub")).is_err());
    }
}
