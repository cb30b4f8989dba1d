//! `am-store` — the Conversation Store: persistence of `conversations`
//! and `turns` rows from the worker event stream (§4.6, §3.1).

pub mod conversation_store;
pub mod pool;

pub use conversation_store::ConversationStore;
pub use pool::connect;
pub use sqlx::AnyPool;
