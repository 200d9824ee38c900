pub mod app;
pub mod collector;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
