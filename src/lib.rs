pub mod config;
pub mod ingest;
pub mod inventory;
pub mod logging;
pub mod model;
pub mod sources;
pub mod stations;
pub mod store;
pub mod sweep;
