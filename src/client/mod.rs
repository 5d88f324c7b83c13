//! Capability set the migration engine needs from a test-management backend.

pub mod http;
pub mod memory;

use crate::error::Result;
use crate::model::{AddCase, AddSection, AddSharedStep, AddSuite, Case, Section, SharedStep, Suite};

/// List and create the four migratable entity types.
///
/// Implementations are shared across import workers, so they must be
/// `Send + Sync`. Every call is blocking and returns the full collection.
pub trait TestRailApi: Send + Sync {
    fn get_suites(&self, project_id: u64) -> Result<Vec<Suite>>;
    fn get_sections(&self, project_id: u64, suite_id: u64) -> Result<Vec<Section>>;
    fn get_shared_steps(&self, project_id: u64) -> Result<Vec<SharedStep>>;
    fn get_cases(&self, project_id: u64, suite_id: u64) -> Result<Vec<Case>>;

    fn add_suite(&self, project_id: u64, request: &AddSuite) -> Result<Suite>;
    fn add_section(&self, project_id: u64, request: &AddSection) -> Result<Section>;
    fn add_shared_step(&self, project_id: u64, request: &AddSharedStep) -> Result<SharedStep>;
    fn add_case(&self, section_id: u64, request: &AddCase) -> Result<Case>;
}
