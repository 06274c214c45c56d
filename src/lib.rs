//! HeishaMon firmware library.
//!
//! Exposes the rule engine and its port traits for integration testing and
//! host-side simulation.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod rules;
pub mod timerqueue;
