//! A native TCPROS subscriber runtime.
//!
//! This crate maintains, for a single named topic, a live TCP connection to every
//! currently-advertised publisher of that topic, frames the byte stream into discrete
//! messages, and fans them out to user callbacks.
//!
//! What this crate does *not* do: resolve publisher names with the ROS master, run the
//! node's own XML-RPC server, generate message types from `.msg` files, or implement the
//! publisher side of TCPROS. Those are external collaborators; see [`RegistryClient`] for
//! the boundary this crate consumes, and [`Subscriber::update_publishers`] for the input
//! the (externally run) master-update handler is expected to feed.

mod connection;
mod dispatch;
mod job_runner;
mod names;
mod registry;
mod supervisor;
mod types;

pub mod tcpros;

pub use connection::{CloseReason, ConnectionState};
pub use dispatch::Callback;
pub use job_runner::{Job, JobQueue, TokioJobQueue};
pub use names::Name;
pub use registry::{RegistryClient, RegistryError, XmlRpcRegistryClient};
pub use types::{MessageEvent, PublisherRef, TopicSpec};

mod subscriber;
pub use subscriber::{Subscriber, SubscriberConfig};
