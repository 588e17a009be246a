//! Proxy Pulse - Batched Proxy Checker
//!
//! A batched, pausable proxy checker. Proxy lists are parsed from text,
//! verified concurrently against a remote testing endpoint, and the
//! results can be exported to CSV or JSON. Runs can be paused, resumed
//! and stopped while in progress.

pub mod proxy;
pub mod tui;

pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
