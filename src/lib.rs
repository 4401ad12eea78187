pub mod config;
pub mod extract;
pub mod graph;
pub mod index;
pub mod query;
pub mod scan;
pub mod store;
