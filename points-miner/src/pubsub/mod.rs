//! Real-time PubSub: connection pool, sessions, and the event dispatcher.

pub mod dispatcher;
pub mod message;
pub mod pool;
mod session;
pub mod topic;

pub use dispatcher::{Dispatcher, DispatcherMsg, StatusCallback};
pub use message::PubSubEvent;
pub use pool::{PubSubPool, MAX_TOPICS_PER_CONNECTION};
pub use topic::{Topic, TopicKind};
