//! Shared application state threaded through every axum handler.

use std::sync::Arc;

use am_store::ConversationStore;

use crate::credential_broker::CredentialBroker;
use crate::dispatcher::Dispatcher;
use crate::fanout::EventFanout;
use crate::registry::WorkerRegistry;
use crate::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<WorkerRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub broker: Arc<CredentialBroker>,
    pub fanout: Arc<EventFanout>,
    pub store: Arc<ConversationStore>,
}
