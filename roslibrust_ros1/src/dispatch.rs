//! Turns a raw [`MessageEvent`] into a deserialized callback invocation, and packages that
//! as a [`Job`] for the job queue to run.

use crate::job_runner::Job;
use crate::types::MessageEvent;
use log::*;
use roslibrust_common::RosMessageType;
use std::sync::Arc;

/// A user-registered message handler. Two variants rather than runtime reflection: a
/// callback either wants just the message, or the message plus the event metadata
/// (publisher name, receipt time, connection header) it arrived with.
pub enum Callback<T> {
    Message(Arc<dyn Fn(T) + Send + Sync>),
    WithEvent(Arc<dyn Fn(T, MessageEvent) + Send + Sync>),
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        match self {
            Callback::Message(f) => Callback::Message(f.clone()),
            Callback::WithEvent(f) => Callback::WithEvent(f.clone()),
        }
    }
}

impl<T> Callback<T> {
    pub fn from_fn(f: impl Fn(T) + Send + Sync + 'static) -> Self {
        Callback::Message(Arc::new(f))
    }

    pub fn from_fn_with_event(f: impl Fn(T, MessageEvent) + Send + Sync + 'static) -> Self {
        Callback::WithEvent(Arc::new(f))
    }

    fn invoke(&self, message: T, event: MessageEvent) {
        match self {
            Callback::Message(f) => f(message),
            Callback::WithEvent(f) => f(message, event),
        }
    }
}

/// Builds the [`Job`] that deserializes `event`'s payload once and fans it out to a
/// snapshot of `callbacks`, in order.
pub fn make_dispatch_job<T: RosMessageType>(event: MessageEvent, callbacks: Arc<[Callback<T>]>) -> Job
where
    T: Clone,
{
    Box::pin(async move {
        let message: T = match serde_rosmsg::from_slice(&event.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "dropping message from publisher {} on topic: failed to deserialize as {}: {e}",
                    event.publisher,
                    T::ROS_TYPE_NAME
                );
                return;
            }
        };
        for callback in callbacks.iter() {
            callback.invoke(message.clone(), event.clone());
        }
    })
}
