//! Terminal UI for interactive proxy checking

pub mod proxy_checker;

pub use proxy_checker::ProxyCheckerApp;
