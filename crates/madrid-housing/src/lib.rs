pub mod analytics;
pub mod config;
pub mod districts;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod telemetry;
