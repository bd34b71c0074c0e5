//! # roslibrust_common
//! This crate provides common types and traits used throughout the roslibrust_ros1
//! subscriber runtime.

/// The central error type used throughout roslibrust_ros1.
///
/// Internal, per-connection failures are recovered locally and never coerced into this
/// type (see the connection and registry error types in `roslibrust_ros1`); this enum is
/// reserved for configuration-time failures surfaced to whoever constructs a subscriber.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Is returned when communication is fully lost.
    /// While this error is being returned messages should be assumed to be being lost.
    #[error("No connection to ROS backend")]
    Disconnected,
    /// Some operations aren't able to conclusively determine if they've failed.
    #[error("Operation timed out: {0}")]
    Timeout(String),
    /// When a message is received but the backend is unable to serialize/deserialize it to
    /// the Rust type representing the message type.
    ///
    /// This error is also returned in the event of an md5sum mismatch.
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Returned when there is a fundamental networking error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// When a topic or node name is used that isn't a valid ROS graph resource name.
    #[error("Name does not meet ROS requirements: {0}")]
    InvalidName(String),
    /// When a subscriber is constructed with an internally inconsistent configuration
    /// (e.g. an empty md5sum for a type that requires one).
    #[error("invalid subscriber configuration: {0}")]
    InvalidConfig(String),
    /// Free for any error that doesn't cleanly fit in the other categories.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Generic result type used throughout roslibrust_ros1.
pub type Result<T> = std::result::Result<T, Error>;

/// Fundamental trait for message types this crate works with.
///
/// This trait is satisfied by any type generated from a ROS `.msg` file (message
/// code-generation itself is out of scope here; hand-written impls are expected for
/// tests and small programs).
pub trait RosMessageType:
    'static + serde::de::DeserializeOwned + Send + serde::Serialize + Sync + Clone + std::fmt::Debug
{
    /// The combination pkg_name/type_name string describing the type to ROS.
    /// Example: `std_msgs/Header`.
    const ROS_TYPE_NAME: &'static str;

    /// The computed md5sum of the message file and its dependencies.
    const MD5SUM: &'static str = "";

    /// The definition from the msg file.
    const DEFINITION: &'static str = "";
}

/// A generic message type used to provide a subscriber without compile-time knowledge of
/// the message schema (the equivalent of rospy's `AnyMsg` / C++'s `ShapeShifter`).
#[derive(serde::Deserialize, serde::Serialize, Debug, Default, Clone, PartialEq)]
pub struct ShapeShifter(pub Vec<u8>);

impl RosMessageType for ShapeShifter {
    const ROS_TYPE_NAME: &'static str = "*";
    const MD5SUM: &'static str = "*";
    const DEFINITION: &'static str = "";
}

/// Functions for calculating md5sums of message definitions.
pub mod md5sum;
