pub mod app;
pub mod atb;
pub mod builder;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod lookup;
pub mod output;
pub mod progress;
pub mod sizes;
pub mod store;
pub mod table;
pub mod taxonomy;
