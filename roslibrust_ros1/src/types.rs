//! Shared data types that flow between the Connection, Supervisor, and Dispatcher.

use roslibrust_common::RosMessageType;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// The immutable description of what a subscriber is subscribed to: a topic name plus
/// the message type it expects publishers to speak.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    pub name: String,
    pub message_type: String,
    pub md5sum: String,
}

impl TopicSpec {
    /// Builds a `TopicSpec` for `T` on `topic_name`, taking the type name and md5sum from
    /// `T`'s `RosMessageType` impl.
    pub fn for_type<T: RosMessageType>(topic_name: impl Into<String>) -> Self {
        Self {
            name: topic_name.into(),
            message_type: T::ROS_TYPE_NAME.to_string(),
            md5sum: T::MD5SUM.to_string(),
        }
    }
}

/// A publisher known to the Supervisor: its graph name and the transport endpoint most
/// recently resolved for it.
#[derive(Debug, Clone)]
pub struct PublisherRef {
    pub name: String,
    pub endpoint: String,
}

/// One received, not-yet-deserialized message, as handed from a Connection to the
/// Dispatcher.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub payload: Vec<u8>,
    pub receipt_time: SystemTime,
    pub publisher: String,
    pub headers: Arc<HashMap<String, String>>,
}
