//! Wire protocol: topic registry and message payload formats

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::{canonicalize_topic, validate_topic, TopicError, TopicKey, TopicRegistry};
