//! Hospital information system core: inpatient bed management (ADT) and
//! pharmacy stock with first-expired-first-out dispensing.
//!
//! Layering follows the usual split:
//! - `api` - axum routes, handlers and middleware
//! - `services` - workflows, preconditions and transaction boundaries
//! - `db` - the storage trait plus PostgreSQL and in-memory implementations
//! - `models` - rows and request payloads shared by all layers

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

pub use error::{Error, Result};
