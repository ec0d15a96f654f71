//! Family expense and income ledger served over HTTP.
//!
//! Requests pass an in-memory admission controller (block-list, per-client
//! rate limit, probe detection) and a shared-secret check before reaching
//! the SQLite-backed handlers.

pub mod admission;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod report;
pub mod routes;

pub use routes::app_router;
