pub mod config;
pub mod error;
pub mod links;
pub mod metrics;
pub mod model;
pub mod reconcile;
pub mod sink;
pub mod snowflake;
pub mod source;
pub mod window;
