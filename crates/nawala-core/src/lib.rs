//! Core domain + application logic for the Nawala domain guard.
//!
//! This crate is intentionally framework-agnostic. Telegram, the shortlink
//! provider and the blocklist checker live behind ports (traits) implemented in
//! adapter crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod monitor;
pub mod notifier;
pub mod ports;
pub mod remediation;
pub mod store;

pub use errors::{Error, Result};
