//! HTTP server in front of the wallet ledger.
//!
//! - [`api`]: axum router, wallet handlers, rate limiting, request ids
//! - [`config`]: environment-driven [`config::ServerConfig`]
//! - [`logging`]: `tracing` subscriber setup
//! - [`metrics`]: Prometheus counters and histograms

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
