//! In-process backend used by tests and offline rehearsals.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::client::TestRailApi;
use crate::error::{Result, SyncError};
use crate::model::{
    AddCase, AddSection, AddSharedStep, AddSuite, Case, EntityKind, Section, SharedStep, Suite,
};

const FIRST_ALLOCATED_ID: u64 = 1000;

#[derive(Default)]
struct State {
    next_id: u64,
    suites: HashMap<u64, Vec<Suite>>,
    sections: HashMap<u64, Vec<Section>>,
    shared_steps: HashMap<u64, Vec<SharedStep>>,
    cases: HashMap<u64, Vec<Case>>,
    section_suite: HashMap<u64, u64>,
    failing_titles: HashSet<String>,
    failing_fetches: HashSet<(EntityKind, u64)>,
    create_calls: usize,
    case_payloads: Vec<(u64, AddCase)>,
    section_payloads: Vec<AddSection>,
}

impl State {
    fn allocate(&mut self) -> u64 {
        if self.next_id == 0 {
            self.next_id = FIRST_ALLOCATED_ID;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_fetch(&self, kind: EntityKind, location: u64) -> Result<()> {
        if self.failing_fetches.contains(&(kind, location)) {
            return Err(SyncError::Api {
                status: 503,
                message: format!("injected fetch failure for {kind} at {location}"),
            });
        }
        Ok(())
    }

    fn check_create(&self, title: &str) -> Result<()> {
        if self.failing_titles.contains(title) {
            return Err(SyncError::Api {
                status: 400,
                message: format!("injected create failure for '{title}'"),
            });
        }
        Ok(())
    }
}

/// Thread-safe fake backend. Projects hold suites and shared steps; suites
/// hold sections and cases. Created IDs start at 1000.
#[derive(Default)]
pub struct MemoryClient {
    state: Mutex<State>,
    create_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every create call for `delay` to force overlapping requests.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seed_suite(&self, project_id: u64, suite: Suite) {
        self.state().suites.entry(project_id).or_default().push(suite);
    }

    pub fn seed_section(&self, suite_id: u64, section: Section) {
        let mut state = self.state();
        state.section_suite.insert(section.id, suite_id);
        state.sections.entry(suite_id).or_default().push(section);
    }

    pub fn seed_shared_step(&self, project_id: u64, step: SharedStep) {
        self.state()
            .shared_steps
            .entry(project_id)
            .or_default()
            .push(step);
    }

    pub fn seed_case(&self, suite_id: u64, case: Case) {
        self.state().cases.entry(suite_id).or_default().push(case);
    }

    /// Make every create call for an entity with this title/name fail.
    pub fn fail_create_titled(&self, title: &str) {
        self.state().failing_titles.insert(title.to_string());
    }

    /// Make listing `kind` at `location` fail. The location is the project
    /// for suites and shared steps, the suite for sections and cases.
    pub fn fail_fetch(&self, kind: EntityKind, location: u64) {
        self.state().failing_fetches.insert((kind, location));
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every `add_case` payload received, with its target section.
    pub fn case_payloads(&self) -> Vec<(u64, AddCase)> {
        self.state().case_payloads.clone()
    }

    pub fn section_payloads(&self) -> Vec<AddSection> {
        self.state().section_payloads.clone()
    }

    pub fn suites_in(&self, project_id: u64) -> Vec<Suite> {
        self.state().suites.get(&project_id).cloned().unwrap_or_default()
    }

    pub fn sections_in(&self, suite_id: u64) -> Vec<Section> {
        self.state().sections.get(&suite_id).cloned().unwrap_or_default()
    }

    pub fn shared_steps_in(&self, project_id: u64) -> Vec<SharedStep> {
        self.state()
            .shared_steps
            .get(&project_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn cases_in(&self, suite_id: u64) -> Vec<Case> {
        self.state().cases.get(&suite_id).cloned().unwrap_or_default()
    }

    /// Wraps one create call: counts it, tracks concurrency, and applies the
    /// configured delay outside the state lock.
    fn creating<T>(&self, title: &str, apply: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            thread::sleep(delay);
        }

        let result = {
            let mut state = self.state();
            state.create_calls += 1;
            state.check_create(title).and_then(|()| apply(&mut state))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl TestRailApi for MemoryClient {
    fn get_suites(&self, project_id: u64) -> Result<Vec<Suite>> {
        let state = self.state();
        state.check_fetch(EntityKind::Suite, project_id)?;
        Ok(state.suites.get(&project_id).cloned().unwrap_or_default())
    }

    fn get_sections(&self, _project_id: u64, suite_id: u64) -> Result<Vec<Section>> {
        let state = self.state();
        state.check_fetch(EntityKind::Section, suite_id)?;
        Ok(state.sections.get(&suite_id).cloned().unwrap_or_default())
    }

    fn get_shared_steps(&self, project_id: u64) -> Result<Vec<SharedStep>> {
        let state = self.state();
        state.check_fetch(EntityKind::SharedStep, project_id)?;
        Ok(state
            .shared_steps
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_cases(&self, _project_id: u64, suite_id: u64) -> Result<Vec<Case>> {
        let state = self.state();
        state.check_fetch(EntityKind::Case, suite_id)?;
        Ok(state.cases.get(&suite_id).cloned().unwrap_or_default())
    }

    fn add_suite(&self, project_id: u64, request: &AddSuite) -> Result<Suite> {
        self.creating(&request.name, |state| {
            let suite = Suite {
                id: state.allocate(),
                name: request.name.clone(),
                description: request.description.clone(),
                extra: Default::default(),
            };
            state.suites.entry(project_id).or_default().push(suite.clone());
            Ok(suite)
        })
    }

    fn add_section(&self, _project_id: u64, request: &AddSection) -> Result<Section> {
        self.creating(&request.name, |state| {
            let suite_id = request.suite_id.ok_or_else(|| SyncError::Api {
                status: 400,
                message: "Field :suite_id is a required field.".into(),
            })?;
            let section = Section {
                id: state.allocate(),
                name: request.name.clone(),
                suite_id: Some(suite_id),
                parent_id: request.parent_id,
                description: request.description.clone(),
                extra: Default::default(),
            };
            state.section_payloads.push(request.clone());
            state.section_suite.insert(section.id, suite_id);
            state.sections.entry(suite_id).or_default().push(section.clone());
            Ok(section)
        })
    }

    fn add_shared_step(&self, project_id: u64, request: &AddSharedStep) -> Result<SharedStep> {
        self.creating(&request.title, |state| {
            let step = SharedStep {
                id: state.allocate(),
                title: request.title.clone(),
                case_ids: Vec::new(),
                steps: request.steps.clone(),
                extra: Default::default(),
            };
            state
                .shared_steps
                .entry(project_id)
                .or_default()
                .push(step.clone());
            Ok(step)
        })
    }

    fn add_case(&self, section_id: u64, request: &AddCase) -> Result<Case> {
        self.creating(&request.title, |state| {
            let suite_id = *state.section_suite.get(&section_id).ok_or_else(|| {
                SyncError::Api {
                    status: 400,
                    message: "Field :section_id is not a valid section.".into(),
                }
            })?;
            let case = Case {
                id: state.allocate(),
                title: request.title.clone(),
                section_id: Some(section_id),
                steps: request.steps.clone(),
                extra: request.fields.clone(),
            };
            state.case_payloads.push((section_id, request.clone()));
            state.cases.entry(suite_id).or_default().push(case.clone());
            Ok(case)
        })
    }
}
