//! Webhook-triggered repository validation.
//!
//! Push notifications are authenticated, queued and validated by external
//! tools; reports and badges are stored per revision.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod workers;

pub use startup::{build_router, AppState, Application};
