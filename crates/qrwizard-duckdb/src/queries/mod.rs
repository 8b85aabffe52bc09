pub mod breakdown;
pub mod export;
pub(crate) mod filters;
pub mod summary;
pub mod timeseries;
pub mod top;
