pub mod fetch;
pub mod mapping;
pub mod migrate;
