use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::client::TestRailApi;
use crate::error::{Result, SyncError};
use crate::migrate::pool::{self, Concurrency};
use crate::migrate::{ItemFailure, Locations};
use crate::model::{
    AddCase, AddSection, AddSharedStep, AddSuite, Case, EntityKind, Section, SharedStep,
    Snapshot, Suite,
};
use crate::store::mapping::{MappingIndex, MappingStatus};

/// How an import stage runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub concurrency: Concurrency,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub created_ids: Vec<u64>,
    pub failed: Vec<ItemFailure>,
}

impl ImportReport {
    fn absorb(&mut self, other: ImportReport) {
        self.imported += other.imported;
        self.created_ids.extend(other.created_ids);
        self.failed.extend(other.failed);
    }
}

/// Anything an import unit can name in logs and failure reports.
pub trait ImportItem: Sync {
    fn source_id(&self) -> u64;
    fn label(&self) -> &str;
}

impl<T: Snapshot> ImportItem for T {
    fn source_id(&self) -> u64 {
        self.id()
    }
    fn label(&self) -> &str {
        Snapshot::label(self)
    }
}

/// A section together with its already-resolved destination parent.
struct PlacedSection<'s> {
    section: &'s Section,
    parent: Option<u64>,
}

impl ImportItem for PlacedSection<'_> {
    fn source_id(&self) -> u64 {
        self.section.id
    }
    fn label(&self) -> &str {
        &self.section.name
    }
}

/// State shared by the units of one stage, guarded by a single lock that is
/// only taken after the network call returns.
struct Ledger<'m> {
    mapping: Option<&'m mut MappingIndex>,
    report: ImportReport,
}

/// Fan `create` out over `items` and collect the outcome.
///
/// With `record` set, each success is written to the mapping as `created`
/// under `kind`. Failures are logged and collected; they never stop sibling
/// units.
fn import_items<I, F>(
    kind: EntityKind,
    items: &[I],
    concurrency: Concurrency,
    record: Option<&mut MappingIndex>,
    create: F,
) -> ImportReport
where
    I: ImportItem,
    F: Fn(&I) -> Result<u64> + Sync,
{
    let ledger = Mutex::new(Ledger {
        mapping: record,
        report: ImportReport::default(),
    });

    pool::for_each(items, concurrency, |item| {
        let outcome = create(item);
        let mut ledger = ledger.lock().unwrap_or_else(|p| p.into_inner());
        match outcome {
            Ok(destination_id) => {
                if let Some(mapping) = ledger.mapping.as_deref_mut() {
                    mapping.record(kind, item.source_id(), destination_id, MappingStatus::Created);
                }
                ledger.report.imported += 1;
                ledger.report.created_ids.push(destination_id);
                info!(%kind, source_id = item.source_id(), destination_id, "created");
            }
            Err(err) => {
                error!(%kind, source_id = item.source_id(), label = item.label(), error = %err, "create failed");
                ledger.report.failed.push(ItemFailure {
                    source_id: item.source_id(),
                    label: item.label().to_string(),
                    message: err.to_string(),
                });
            }
        }
    });

    let mut report = ledger.into_inner().unwrap_or_else(|p| p.into_inner()).report;
    report.created_ids.sort_unstable();
    report.failed.sort_by_key(|f| f.source_id);
    report
}

pub fn import_suites(
    client: &dyn TestRailApi,
    loc: &Locations,
    novel: &[Suite],
    mapping: &mut MappingIndex,
    options: ImportOptions,
) -> ImportReport {
    if options.dry_run || novel.is_empty() {
        return ImportReport::default();
    }
    import_items(
        EntityKind::Suite,
        novel,
        options.concurrency,
        Some(mapping),
        |suite| {
            let request = AddSuite::from(suite);
            Ok(client.add_suite(loc.dst_project, &request)?.id)
        },
    )
}

/// Import sections parents-first. Each depth level is one concurrent wave;
/// a section's parent is rewritten through the mapping once the previous
/// waves have landed. A parent with no mapping yields a root section.
pub fn import_sections(
    client: &dyn TestRailApi,
    loc: &Locations,
    novel: &[Section],
    mapping: &mut MappingIndex,
    options: ImportOptions,
) -> ImportReport {
    let mut report = ImportReport::default();
    if options.dry_run || novel.is_empty() {
        return report;
    }

    for wave in depth_waves(novel) {
        let placed: Vec<PlacedSection<'_>> = wave
            .into_iter()
            .map(|section| {
                let parent = section.parent_id.and_then(|pid| {
                    let mapped = mapping.lookup(EntityKind::Section, pid);
                    if mapped.is_none() {
                        warn!(source_id = section.id, parent_id = pid, "parent section has no mapping, creating at root");
                    }
                    mapped
                });
                PlacedSection { section, parent }
            })
            .collect();

        let wave_report = import_items(
            EntityKind::Section,
            &placed,
            options.concurrency,
            Some(&mut *mapping),
            |placed| {
                let request = AddSection {
                    name: placed.section.name.clone(),
                    description: placed.section.description.clone(),
                    suite_id: Some(loc.dst_suite),
                    parent_id: placed.parent,
                };
                Ok(client.add_section(loc.dst_project, &request)?.id)
            },
        );
        report.absorb(wave_report);
    }

    report.created_ids.sort_unstable();
    report.failed.sort_by_key(|f| f.source_id);
    report
}

/// Group sections by how many of their ancestors are also being imported.
fn depth_waves(sections: &[Section]) -> Vec<Vec<&Section>> {
    let parents: HashMap<u64, Option<u64>> =
        sections.iter().map(|s| (s.id, s.parent_id)).collect();

    let depth_of = |section: &Section| -> usize {
        let mut depth = 0;
        let mut cursor = section.parent_id;
        while let Some(pid) = cursor {
            match parents.get(&pid) {
                // bounded so a malformed parent cycle cannot spin forever
                Some(&next) if depth < sections.len() => {
                    depth += 1;
                    cursor = next;
                }
                _ => break,
            }
        }
        depth
    };

    let mut waves: Vec<Vec<&Section>> = Vec::new();
    for section in sections {
        let depth = depth_of(section);
        if waves.len() <= depth {
            waves.resize_with(depth + 1, Vec::new);
        }
        waves[depth].push(section);
    }
    waves.retain(|w| !w.is_empty());
    waves
}

pub fn import_shared_steps(
    client: &dyn TestRailApi,
    loc: &Locations,
    novel: &[SharedStep],
    mapping: &mut MappingIndex,
    options: ImportOptions,
) -> ImportReport {
    if options.dry_run || novel.is_empty() {
        return ImportReport::default();
    }
    import_items(
        EntityKind::SharedStep,
        novel,
        options.concurrency,
        Some(mapping),
        |step| {
            let request = AddSharedStep::from(step);
            Ok(client.add_shared_step(loc.dst_project, &request)?.id)
        },
    )
}

/// Import cases. Case pairs are not added to the mapping; it is only read
/// to rewrite shared-step references and to place each case in a section.
pub fn import_cases(
    client: &dyn TestRailApi,
    loc: &Locations,
    novel: &[Case],
    mapping: &MappingIndex,
    options: ImportOptions,
) -> ImportReport {
    if options.dry_run || novel.is_empty() {
        return ImportReport::default();
    }
    import_items(EntityKind::Case, novel, options.concurrency, None, |case| {
        let section_id = target_section(case, loc, mapping)?;
        let request = case_request(case, mapping);
        Ok(client.add_case(section_id, &request)?.id)
    })
}

/// Build the create payload for `case`, substituting mapped shared-step IDs.
/// Unmapped references are kept as-is and logged.
pub fn case_request(case: &Case, mapping: &MappingIndex) -> AddCase {
    let mut request = AddCase::from(case);
    for step in &mut request.steps {
        let Some(source_ref) = step.shared_step_id else {
            continue;
        };
        match mapping.lookup(EntityKind::SharedStep, source_ref) {
            Some(destination_ref) => step.shared_step_id = Some(destination_ref),
            None => warn!(
                case_id = case.id,
                shared_step_id = source_ref,
                "shared step reference has no mapping, keeping source id"
            ),
        }
    }
    request
}

fn target_section(case: &Case, loc: &Locations, mapping: &MappingIndex) -> Result<u64> {
    case.section_id
        .and_then(|sid| mapping.lookup(EntityKind::Section, sid))
        .or(loc.dst_section)
        .ok_or(SyncError::NoTargetSection(case.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryClient;
    use crate::model::Step;
    use std::time::Duration;

    fn loc() -> Locations {
        Locations {
            src_project: 1,
            src_suite: 10,
            dst_project: 2,
            dst_suite: 20,
            dst_section: None,
        }
    }

    fn opts() -> ImportOptions {
        ImportOptions {
            dry_run: false,
            concurrency: Concurrency::Bounded(4),
        }
    }

    fn section(id: u64, name: &str, parent_id: Option<u64>) -> Section {
        Section {
            id,
            name: name.into(),
            suite_id: Some(10),
            parent_id,
            description: None,
            extra: Default::default(),
        }
    }

    fn shared(id: u64, title: &str) -> SharedStep {
        SharedStep {
            id,
            title: title.into(),
            case_ids: Vec::new(),
            steps: vec![Step {
                content: format!("{title} step"),
                ..Step::default()
            }],
            extra: Default::default(),
        }
    }

    fn case(id: u64, title: &str, section_id: u64, refs: &[Option<u64>]) -> Case {
        Case {
            id,
            title: title.into(),
            section_id: Some(section_id),
            steps: refs
                .iter()
                .map(|r| Step {
                    content: "do".into(),
                    shared_step_id: *r,
                    ..Step::default()
                })
                .collect(),
            extra: Default::default(),
        }
    }

    #[test]
    fn dry_run_issues_no_calls_and_leaves_mapping_alone() {
        let client = MemoryClient::new();
        let mut mapping = MappingIndex::new();
        let report = import_shared_steps(
            &client,
            &loc(),
            &[shared(5, "Login"), shared(6, "Logout")],
            &mut mapping,
            ImportOptions {
                dry_run: true,
                ..opts()
            },
        );
        assert_eq!(report, ImportReport::default());
        assert_eq!(client.create_calls(), 0);
        assert!(mapping.is_empty());
    }

    #[test]
    fn created_shared_step_is_recorded() {
        let client = MemoryClient::new();
        let mut mapping = MappingIndex::new();
        let report = import_shared_steps(&client, &loc(), &[shared(5, "Login")], &mut mapping, opts());

        assert_eq!(report.imported, 1);
        let entry = mapping.get(EntityKind::SharedStep, 5).unwrap();
        assert_eq!(entry.status, MappingStatus::Created);
        assert_eq!(report.created_ids, vec![entry.destination_id]);
        assert_eq!(client.shared_steps_in(2)[0].steps[0].content, "Login step");
    }

    #[test]
    fn failures_are_counted_per_item() {
        let client = MemoryClient::new();
        client.fail_create_titled("Broken");
        let mut mapping = MappingIndex::new();
        let report = import_shared_steps(
            &client,
            &loc(),
            &[shared(1, "A"), shared(2, "Broken"), shared(3, "C")],
            &mut mapping,
            opts(),
        );
        assert_eq!(client.create_calls(), 3);
        assert_eq!(report.imported, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].source_id, 2);
        assert_eq!(mapping.lookup(EntityKind::SharedStep, 2), None);
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn case_payload_carries_mapped_shared_step() {
        let mut mapping = MappingIndex::new();
        mapping.record(EntityKind::SharedStep, 5, 105, MappingStatus::Created);
        let source = case(1, "Checkout", 7, &[Some(5), None, Some(9)]);

        let request = case_request(&source, &mapping);
        assert_eq!(request.steps[0].shared_step_id, Some(105));
        assert_eq!(request.steps[1].shared_step_id, None);
        assert_eq!(request.steps[2].shared_step_id, Some(9));
        assert_eq!(source.steps[0].shared_step_id, Some(5));
    }

    #[test]
    fn cases_land_in_mapped_section_and_skip_mapping() {
        let client = MemoryClient::new();
        client.seed_section(20, section(700, "Dest", None));
        let mut mapping = MappingIndex::new();
        mapping.record(EntityKind::Section, 7, 700, MappingStatus::Existing);
        mapping.record(EntityKind::SharedStep, 5, 105, MappingStatus::Created);

        let report = import_cases(
            &client,
            &loc(),
            &[case(1, "Checkout", 7, &[Some(5)])],
            &mapping,
            opts(),
        );
        assert_eq!(report.imported, 1);
        assert_eq!(mapping.lookup(EntityKind::Case, 1), None);

        let payloads = client.case_payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].0, 700);
        assert_eq!(payloads[0].1.steps[0].shared_step_id, Some(105));
    }

    #[test]
    fn case_without_section_is_a_per_item_failure() {
        let client = MemoryClient::new();
        let mapping = MappingIndex::new();
        let report = import_cases(
            &client,
            &loc(),
            &[case(1, "Orphan", 7, &[])],
            &mapping,
            opts(),
        );
        assert_eq!(report.imported, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].message.contains("no destination section"));
        assert_eq!(client.create_calls(), 0);
    }

    #[test]
    fn sections_import_parents_first_and_remap_parent() {
        let client = MemoryClient::new();
        let mut mapping = MappingIndex::new();
        let novel = vec![
            section(3, "Grandchild", Some(2)),
            section(2, "Child", Some(1)),
            section(1, "Root", None),
        ];

        let report = import_sections(&client, &loc(), &novel, &mut mapping, opts());
        assert_eq!(report.imported, 3);

        let root = mapping.lookup(EntityKind::Section, 1).unwrap();
        let child = mapping.lookup(EntityKind::Section, 2).unwrap();
        let created = client.sections_in(20);
        let child_section = created.iter().find(|s| s.id == child).unwrap();
        assert_eq!(child_section.parent_id, Some(root));
        let grandchild = created.iter().find(|s| s.name == "Grandchild").unwrap();
        assert_eq!(grandchild.parent_id, Some(child));

        let payloads = client.section_payloads();
        assert_eq!(
            payloads.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["Root", "Child", "Grandchild"]
        );
        assert!(payloads.iter().all(|p| p.suite_id == Some(20)));
    }

    #[test]
    fn section_with_unmapped_parent_is_created_at_root() {
        let client = MemoryClient::new();
        let mut mapping = MappingIndex::new();

        let report = import_sections(
            &client,
            &loc(),
            &[section(4, "Stray", Some(99))],
            &mut mapping,
            opts(),
        );
        assert_eq!(report.imported, 1);

        let payloads = client.section_payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].parent_id, None);
    }

    #[test]
    fn depth_waves_group_by_ancestry() {
        let sections = vec![
            section(2, "b", Some(1)),
            section(1, "a", None),
            section(4, "d", Some(99)),
        ];
        let waves = depth_waves(&sections);
        let ids: Vec<Vec<u64>> = waves
            .iter()
            .map(|w| w.iter().map(|s| s.id).collect())
            .collect();
        assert_eq!(ids, vec![vec![1, 4], vec![2]]);
    }

    #[test]
    fn concurrent_import_matches_sequential_result() {
        let client = MemoryClient::new().with_create_delay(Duration::from_millis(5));
        let steps: Vec<SharedStep> = (1..=24).map(|i| shared(i, &format!("step-{i}"))).collect();
        let mut mapping = MappingIndex::new();

        let report = import_shared_steps(
            &client,
            &loc(),
            &steps,
            &mut mapping,
            ImportOptions {
                dry_run: false,
                concurrency: Concurrency::Bounded(6),
            },
        );

        assert_eq!(report.imported, 24);
        assert_eq!(mapping.counts().created, 24);
        assert!(client.max_in_flight() <= 6);
        let mut destinations: Vec<u64> = mapping.snapshot().iter().map(|e| e.destination_id).collect();
        destinations.sort_unstable();
        destinations.dedup();
        assert_eq!(destinations.len(), 24);
        assert_eq!(destinations, report.created_ids);
    }
}
