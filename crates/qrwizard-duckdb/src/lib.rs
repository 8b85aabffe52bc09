pub mod backend;
pub mod conversions;
pub mod goals;
pub mod history;
pub mod links;
pub mod queries;
pub mod retention;
pub mod scans;
pub mod schema;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `qrwizard_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
