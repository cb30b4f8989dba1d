//! `am-protocol` — wire types shared between the control plane, the
//! worker runtime, and dashboard clients: the worker event envelope,
//! the control-plane universe cache projection, and the HTTP request/
//! response DTOs for both the control-plane and worker-local surfaces.

pub mod cache;
pub mod control_api;
pub mod event;
pub mod worker_api;

pub const PROTOCOL_VERSION: u32 = 1;

pub use event::{EventType, WorkerEvent};
