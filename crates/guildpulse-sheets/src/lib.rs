//! Google Sheets destination for weekly reports.
//!
//! [`auth`] turns a service-account key into short-lived OAuth2 access tokens;
//! [`client::SheetsSink`] uses them to upsert report rows through the Sheets
//! v4 REST API.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AccessTokenSource, ServiceAccountKey, ServiceAccountTokens, StaticToken};
pub use client::SheetsSink;
pub use error::SheetsError;
