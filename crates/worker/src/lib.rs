//! `am-worker` — the worker process binary: registers with the control
//! plane, runs the heartbeat and event loops, and serves the
//! worker-local HTTP surface that accepts launches from the Dispatcher.

pub mod cli;
pub mod config;
pub mod http;

pub use config::Config;
