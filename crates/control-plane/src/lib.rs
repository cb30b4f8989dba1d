//! `am-control-plane` — the control plane: Worker Registry, Liveness
//! Reaper, Credential Broker, Dispatcher, and Event Fan-out (§4.1-§4.6),
//! wired together behind the control-plane HTTP/WS surface (§6).

pub mod cli;
pub mod config;
pub mod credential_broker;
pub mod dispatcher;
pub mod fanout;
pub mod http;
pub mod reaper;
pub mod registry;
pub mod state;

pub use config::Config;
pub use state::AppState;
