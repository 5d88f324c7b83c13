//! Copy suites, sections, shared steps and cases between test-management
//! projects without creating duplicates, keeping shared-step references in
//! migrated cases pointed at their destination copies.

pub mod build_info;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod output;
pub mod store;
