pub mod command;
pub mod config;
pub mod engine;
pub mod model;
pub mod observability;
pub mod schema;
pub mod store;
