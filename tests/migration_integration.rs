use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use railsync::client::memory::MemoryClient;
use railsync::commands::migrate::{self, MigrateArgs, Target};
use railsync::config::Config;
use railsync::error::{Result, SyncError};
use railsync::logging::LogGuard;
use railsync::migrate::{AutoApprove, Concurrency, Confirm, Locations, MigrationContext, StageOptions};
use railsync::model::{Case, EntityKind, Section, SharedStep, Step, Suite};
use railsync::store::mapping::{MappingIndex, MappingStatus};
use serde_json::json;
use tempfile::tempdir;

const SRC_PROJECT: u64 = 1;
const SRC_SUITE: u64 = 10;
const DST_PROJECT: u64 = 2;
const DST_SUITE: u64 = 20;

fn locations() -> Locations {
    Locations {
        src_project: SRC_PROJECT,
        src_suite: SRC_SUITE,
        dst_project: DST_PROJECT,
        dst_suite: DST_SUITE,
        dst_section: None,
    }
}

fn approve() -> StageOptions {
    StageOptions {
        auto_approve: true,
        ..StageOptions::default()
    }
}

fn suite(id: u64, name: &str) -> Suite {
    Suite {
        id,
        name: name.into(),
        description: None,
        extra: Default::default(),
    }
}

fn section(id: u64, name: &str, parent_id: Option<u64>) -> Section {
    Section {
        id,
        name: name.into(),
        suite_id: None,
        parent_id,
        description: None,
        extra: Default::default(),
    }
}

fn shared(id: u64, title: &str, case_ids: Vec<u64>) -> SharedStep {
    SharedStep {
        id,
        title: title.into(),
        case_ids,
        steps: vec![Step {
            content: format!("{title}: enter credentials"),
            expected: Some("accepted".into()),
            ..Step::default()
        }],
        extra: Default::default(),
    }
}

fn case(id: u64, title: &str, section_id: u64, shared_ref: Option<u64>) -> Case {
    serde_json::from_value(json!({
        "id": id,
        "title": title,
        "section_id": section_id,
        "priority_id": 2,
        "custom_steps_separated": [
            {"content": "open app"},
            {"shared_step_id": shared_ref}
        ]
    }))
    .unwrap()
}

struct CountingConfirm {
    answer: bool,
    asked: AtomicUsize,
}

impl Confirm for CountingConfirm {
    fn confirm(&self, _kind: EntityKind, _novel: usize) -> Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

#[test]
fn unused_shared_step_is_created_and_mapped() {
    let client = MemoryClient::new();
    client.seed_shared_step(SRC_PROJECT, shared(5, "Login", vec![]));

    let mut ctx = MigrationContext::new(&client, locations());
    let report = ctx.migrate_shared_steps(&approve(), &AutoApprove).unwrap();

    assert_eq!(report.novel, 1);
    assert_eq!(report.imported, 1);
    let entry = ctx
        .mapping()
        .into_iter()
        .find(|e| e.kind == EntityKind::SharedStep && e.source_id == 5)
        .unwrap();
    assert_eq!(entry.status, MappingStatus::Created);
    assert_eq!(report.created_ids, vec![entry.destination_id]);
    assert_eq!(client.shared_steps_in(DST_PROJECT)[0].id, entry.destination_id);
}

#[test]
fn matching_suite_is_mapped_without_create_call() {
    let client = MemoryClient::new();
    client.seed_suite(SRC_PROJECT, suite(10, "Regression"));
    client.seed_suite(DST_PROJECT, suite(200, "Regression"));

    let mut ctx = MigrationContext::new(&client, locations());
    let report = ctx.migrate_suites(&approve(), &AutoApprove).unwrap();

    assert_eq!(report.existing, 1);
    assert_eq!(report.novel, 0);
    assert_eq!(client.create_calls(), 0);
    let mapping = ctx.mapping_index();
    let entry = mapping.get(EntityKind::Suite, 10).unwrap();
    assert_eq!(entry.destination_id, 200);
    assert_eq!(entry.status, MappingStatus::Existing);
}

#[test]
fn case_reference_uses_mapping_from_prior_run() {
    let client = MemoryClient::new();
    client.seed_section(DST_SUITE, section(900, "Checkout", None));
    client.seed_case(SRC_SUITE, case(1, "Pay by card", 7, Some(5)));

    let mut prior = MappingIndex::new();
    prior.record(EntityKind::SharedStep, 5, 105, MappingStatus::Created);
    prior.record(EntityKind::Section, 7, 900, MappingStatus::Existing);

    let mut ctx = MigrationContext::new(&client, locations()).with_mapping(prior);
    let report = ctx.migrate_cases(&approve(), &AutoApprove).unwrap();

    assert_eq!(report.imported, 1);
    let payloads = client.case_payloads();
    assert_eq!(payloads[0].0, 900);
    assert_eq!(payloads[0].1.steps[1].shared_step_id, Some(105));
    assert_eq!(payloads[0].1.fields["priority_id"], 2);
    assert!(!ctx.mapping().iter().any(|e| e.kind == EntityKind::Case));
}

#[test]
fn dry_run_reports_counts_but_creates_nothing() {
    let client = MemoryClient::new();
    client.seed_section(DST_SUITE, section(900, "Checkout", None));
    for (id, title) in [(1, "A"), (2, "B"), (3, "C")] {
        client.seed_case(SRC_SUITE, case(id, title, 7, None));
    }

    let mut ctx = MigrationContext::new(&client, locations());
    let confirm = CountingConfirm {
        answer: true,
        asked: AtomicUsize::new(0),
    };
    let report = ctx
        .migrate_cases(
            &StageOptions {
                dry_run: true,
                ..StageOptions::default()
            },
            &confirm,
        )
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.novel, 3);
    assert_eq!(report.imported, 0);
    assert_eq!(ctx.imported(), 0);
    assert_eq!(client.create_calls(), 0);
    assert_eq!(confirm.asked.load(Ordering::SeqCst), 0);
}

#[test]
fn full_migration_stops_at_failed_section_fetch() {
    let client = MemoryClient::new();
    client.seed_suite(SRC_PROJECT, suite(10, "Regression"));
    client.seed_shared_step(SRC_PROJECT, shared(5, "Login", vec![]));
    client.seed_case(SRC_SUITE, case(1, "A", 7, None));
    client.fail_fetch(EntityKind::Section, DST_SUITE);

    let mut ctx = MigrationContext::new(&client, locations());
    let err = ctx.migrate_full(&approve(), &AutoApprove).unwrap_err();

    assert!(matches!(
        err,
        SyncError::Fetch {
            kind: EntityKind::Section,
            ..
        }
    ));
    assert_eq!(client.suites_in(DST_PROJECT).len(), 1);
    assert!(client.sections_in(DST_SUITE).is_empty());
    assert!(client.shared_steps_in(DST_PROJECT).is_empty());
    assert!(client.cases_in(DST_SUITE).is_empty());
}

#[test]
fn full_migration_carries_mapping_across_stages() {
    let client = MemoryClient::new();
    client.seed_suite(SRC_PROJECT, suite(10, "Regression"));
    client.seed_section(SRC_SUITE, section(7, "Checkout", None));
    client.seed_section(SRC_SUITE, section(8, "Cards", Some(7)));
    client.seed_shared_step(SRC_PROJECT, shared(5, "Login", vec![]));
    client.seed_shared_step(SRC_PROJECT, shared(6, "Pay", vec![1]));
    client.seed_case(SRC_SUITE, case(1, "Pay by card", 8, Some(5)));

    let mut ctx = MigrationContext::new(&client, locations()).with_concurrency(Concurrency::Bounded(2));
    let reports = ctx.migrate_full(&approve(), &AutoApprove).unwrap();

    let kinds: Vec<EntityKind> = reports.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, EntityKind::FULL_ORDER.to_vec());

    let shared_report = &reports[2];
    assert_eq!(shared_report.in_use, 1);
    assert_eq!(shared_report.imported, 1);

    let mapping = ctx.mapping_index().clone();
    let cards = mapping.lookup(EntityKind::Section, 8).unwrap();
    let login = mapping.lookup(EntityKind::SharedStep, 5).unwrap();

    let payloads = client.case_payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].0, cards);
    assert_eq!(payloads[0].1.steps[1].shared_step_id, Some(login));
    assert_eq!(ctx.imported(), 1 + 2 + 1 + 1);
}

#[test]
fn declined_confirmation_aborts_before_any_create() {
    let client = MemoryClient::new();
    client.seed_suite(SRC_PROJECT, suite(10, "Regression"));

    let confirm = CountingConfirm {
        answer: false,
        asked: AtomicUsize::new(0),
    };
    let mut ctx = MigrationContext::new(&client, locations());
    let err = ctx
        .migrate_suites(&StageOptions::default(), &confirm)
        .unwrap_err();

    assert!(matches!(err, SyncError::Aborted(EntityKind::Suite)));
    assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
    assert_eq!(client.create_calls(), 0);
}

#[test]
fn per_item_failures_do_not_fail_the_stage() {
    let client = MemoryClient::new().with_create_delay(Duration::from_millis(2));
    for i in 0..12 {
        client.seed_suite(SRC_PROJECT, suite(100 + i, &format!("suite-{i}")));
    }
    client.fail_create_titled("suite-3");
    client.fail_create_titled("suite-7");

    let mut ctx = MigrationContext::new(&client, locations()).with_concurrency(Concurrency::Unbounded);
    let report = ctx.migrate_suites(&approve(), &AutoApprove).unwrap();

    assert_eq!(report.novel, 12);
    assert_eq!(report.imported, 10);
    assert_eq!(ctx.imported(), 10);
    let failed: Vec<u64> = report.failed.iter().map(|f| f.source_id).collect();
    assert_eq!(failed, vec![103, 107]);
    assert_eq!(ctx.mapping_index().counts_for(EntityKind::Suite).created, 10);
}

#[test]
fn export_writes_snapshots_and_mapping() {
    let dir = tempdir().unwrap();
    let client = MemoryClient::new();
    client.seed_suite(SRC_PROJECT, suite(10, "Regression"));
    client.seed_suite(SRC_PROJECT, suite(11, "Smoke"));
    client.seed_suite(DST_PROJECT, suite(200, "Regression"));

    let mut ctx = MigrationContext::new(&client, locations());
    let report = ctx
        .migrate_suites(
            &StageOptions {
                auto_approve: true,
                export_snapshots: true,
                export_mapping: true,
                log_dir: dir.path().to_path_buf(),
                ..StageOptions::default()
            },
            &AutoApprove,
        )
        .unwrap();

    assert_eq!(report.exported.len(), 2);
    assert!(report.exported[0].contains("suites_all_"));
    assert!(report.exported[1].contains("suites_filtered_"));
    let mapping_file = report.mapping_file.unwrap();
    let loaded = MappingIndex::load(std::path::Path::new(&mapping_file)).unwrap();
    assert_eq!(loaded.lookup(EntityKind::Suite, 10), Some(200));
    assert_eq!(loaded.get(EntityKind::Suite, 11).unwrap().status, MappingStatus::Created);
}

#[test]
fn execute_resumes_from_and_updates_mapping_file() {
    let dir = tempdir().unwrap();
    let mapping_path = dir.path().join("mapping.json");
    let config = Config {
        log_dir: dir.path().join("logs"),
        ..Config::default()
    };

    let client = MemoryClient::new();
    client.seed_shared_step(SRC_PROJECT, shared(5, "Login", vec![]));
    client.seed_section(DST_SUITE, section(900, "Checkout", None));
    client.seed_case(SRC_SUITE, case(1, "Pay by card", 7, Some(5)));

    let args = |target_mapping: &std::path::Path| MigrateArgs {
        locations: Locations {
            dst_section: Some(900),
            ..locations()
        },
        dry_run: false,
        yes: true,
        export: false,
        mapping: Some(target_mapping.to_path_buf()),
    };

    let first = migrate::execute(
        &client,
        &config,
        LogGuard::disabled(),
        Target::SharedSteps,
        args(&mapping_path),
        &AutoApprove,
    )
    .unwrap();
    assert_eq!(first.imported_total, 1);
    let saved = MappingIndex::load(&mapping_path).unwrap();
    let login = saved.lookup(EntityKind::SharedStep, 5).unwrap();

    let second = migrate::execute(
        &client,
        &config,
        LogGuard::disabled(),
        Target::Cases,
        args(&mapping_path),
        &AutoApprove,
    )
    .unwrap();
    assert_eq!(second.imported_total, 1);
    assert_eq!(second.mapping_entries, 1);

    let payloads = client.case_payloads();
    assert_eq!(payloads[0].0, 900);
    assert_eq!(payloads[0].1.steps[1].shared_step_id, Some(login));
}
