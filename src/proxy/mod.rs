//! Proxy module for parsing, checking and exporting proxies
//!
//! This module provides functionality for:
//! - Parsing proxies from text lists (IP:PORT, scheme://IP:PORT)
//! - Checking proxy validity in concurrency-limited batches, with
//!   pause/resume/stop control while a run is in progress
//! - Rating working proxies by measured speed
//! - Exporting working proxies to CSV and JSON

pub mod checker;
pub mod client;
pub mod export;
pub mod models;
pub mod parser;

pub use checker::{CheckerSettings, ProgressFn, ProxyChecker};
pub use client::{ProxyVerifier, TestOutcome, VerifyClient, DEFAULT_API_URL};
pub use models::{speed_rating, Proxy, ProxyStatus, ProxyType};
pub use parser::ProxyParser;
