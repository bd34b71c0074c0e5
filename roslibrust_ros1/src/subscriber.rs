//! The public entry point: wires a [`TopicSpec`], a [`RegistryClient`], and a [`JobQueue`]
//! together into a running Supervisor, and exposes the handful of operations the rest of
//! the node is allowed to perform against it.

use crate::connection::ConnectionState;
use crate::dispatch::Callback;
use crate::job_runner::{JobQueue, TokioJobQueue};
use crate::names::Name;
use crate::registry::RegistryClient;
use crate::supervisor::{self, SupervisorConfig, SupervisorHandle};
use crate::types::{MessageEvent, TopicSpec};
use abort_on_drop::ChildTask;
use roslibrust_common::{Error, RosMessageType};
use std::sync::Arc;
use std::time::Duration;

/// Tunables and collaborators for a [`Subscriber`]. Construct one with [`SubscriberConfig::new`]
/// and override fields before passing it to [`Subscriber::new`]; every default matches the
/// value named in this crate's design spec.
pub struct SubscriberConfig {
    /// The `callerid` this node identifies itself as in the outbound connection header.
    pub caller_id: String,
    /// Bound on TCP connect and on writing/reading the connection header.
    pub dial_timeout: Duration,
    /// Bound on a single frame read once the connection is `Ready`. Publishers may
    /// legitimately go quiet between messages, so this is deliberately generous relative
    /// to `dial_timeout`; exceeding it is treated as desync (`Resync`), not as evidence the
    /// publisher is gone.
    pub read_timeout: Duration,
    /// Bound on handing one frame from a Connection to the Supervisor's dispatch queue.
    pub delivery_budget: Duration,
    /// Bound on enqueuing one dispatch job onto the job queue.
    pub job_budget: Duration,
    /// Depth of the default job queue, when `job_queue` is left unset. Ignored if a shared
    /// `job_queue` is supplied instead.
    pub job_queue_depth: usize,
    /// Resolves publisher endpoints and unregisters this subscriber on shutdown.
    pub registry: Arc<dyn RegistryClient>,
    /// The node-wide job runner callbacks are dispatched through. Leave unset to get a
    /// private single-worker queue sized by `job_queue_depth`; share one `Arc` across every
    /// `Subscriber` in a process to get the "one runner per node" topology this crate's
    /// design spec describes.
    pub job_queue: Option<Arc<dyn JobQueue>>,
}

impl SubscriberConfig {
    /// Builds a config with every default from this crate's design spec: a 3s dial budget,
    /// a 60s steady-state read budget, a 30ms delivery budget, a 3s job budget, and a
    /// 128-deep private job queue.
    pub fn new(caller_id: impl Into<String>, registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            caller_id: caller_id.into(),
            dial_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(60),
            delivery_budget: Duration::from_millis(30),
            job_budget: Duration::from_secs(3),
            job_queue_depth: 128,
            registry,
            job_queue: None,
        }
    }

    /// Shares `job_queue` across this and every other `Subscriber` constructed with a
    /// config built from it, instead of giving this `Subscriber` a private one.
    pub fn with_job_queue(mut self, job_queue: Arc<dyn JobQueue>) -> Self {
        self.job_queue = Some(job_queue);
        self
    }
}

/// A live subscription to one topic.
///
/// Maintains a Connection to every publisher named in the most recent call to
/// [`update_publishers`](Subscriber::update_publishers), delivering deserialized messages
/// to every callback registered with [`add_callback`](Subscriber::add_callback). Dropping a
/// `Subscriber` aborts its Supervisor (and every Connection it owns) but does not
/// unregister with the master; call [`shutdown`](Subscriber::shutdown) for a clean exit.
pub struct Subscriber<T> {
    handle: SupervisorHandle<T>,
    _supervisor: ChildTask<()>,
    topic: TopicSpec,
}

impl<T> Subscriber<T>
where
    T: RosMessageType + Clone + Send + Sync + 'static,
{
    /// Validates `topic_name` and `T`, then spawns the Supervisor actor for this topic.
    ///
    /// The only errors this returns are configuration-time ones: an invalid topic name, or
    /// a message type with no `MD5SUM` set. Everything that can go wrong once the
    /// subscriber is running (a dial failure, a type mismatch with one publisher, a dropped
    /// connection) is handled internally, per this crate's error propagation policy.
    pub fn new(topic_name: impl Into<String>, config: SubscriberConfig) -> Result<Self, Error> {
        let name = Name::new(topic_name.into())?;
        if T::MD5SUM.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "message type {} has no md5sum set",
                T::ROS_TYPE_NAME
            )));
        }

        let topic = TopicSpec::for_type::<T>(name.as_str());
        let job_queue = config
            .job_queue
            .unwrap_or_else(|| Arc::new(TokioJobQueue::spawn(config.job_queue_depth)));

        let supervisor_config = SupervisorConfig {
            topic: topic.clone(),
            caller_id: config.caller_id,
            dial_timeout: config.dial_timeout,
            read_timeout: config.read_timeout,
            delivery_budget: config.delivery_budget,
            job_budget: config.job_budget,
            registry: config.registry,
            job_queue,
        };
        let (handle, supervisor) = supervisor::spawn(supervisor_config);
        Ok(Self {
            handle,
            _supervisor: supervisor,
            topic,
        })
    }

    /// The topic this subscriber was constructed for.
    pub fn topic(&self) -> &TopicSpec {
        &self.topic
    }

    /// Registers a callback invoked with just the decoded message, once per received frame.
    pub async fn subscribe(&self, callback: impl Fn(T) + Send + Sync + 'static) {
        self.handle.add_callback(Callback::from_fn(callback)).await;
    }

    /// Registers a callback invoked with the decoded message and the [`MessageEvent`] it
    /// arrived in (publisher name, receipt time, negotiated headers).
    pub async fn subscribe_with_event(
        &self,
        callback: impl Fn(T, MessageEvent) + Send + Sync + 'static,
    ) {
        self.handle
            .add_callback(Callback::from_fn_with_event(callback))
            .await;
    }

    /// Replaces the set of publishers this subscriber maintains connections to: a
    /// Connection is started for every publisher name newly present in `publisher_uris`
    /// and torn down for every one no longer present. This is what a master-update handler
    /// (external to this crate, per its scope) is expected to call on every
    /// `publisherUpdate`.
    pub async fn update_publishers(&self, publisher_uris: Vec<String>) {
        self.handle.update_publishers(publisher_uris).await;
    }

    /// Enables or disables delivery. A disabled subscriber still reads from the socket (so
    /// publishers never see backpressure from it) but drops every frame instead of
    /// dispatching it.
    pub async fn set_enabled(&self, enabled: bool) {
        self.handle.set_enabled(enabled).await;
    }

    /// How many publishers currently have a live Connection.
    pub async fn publisher_count(&self) -> usize {
        self.handle.publisher_count().await
    }

    /// The lifecycle state of the Connection currently tracked for `publisher_uri`
    /// (`Dialing`, `Handshaking`, `Ready`, or `Closed`), or `None` if no Connection is
    /// tracked for it. Diagnostic only: per this crate's error propagation policy, no
    /// per-publisher error ever reaches the caller through this or any other query.
    pub async fn connection_state(&self, publisher_uri: &str) -> Option<ConnectionState> {
        self.handle.connection_state(publisher_uri).await
    }

    /// Unregisters from the master, cancels every Connection, and waits for teardown to
    /// finish before returning. After this returns, no further callback invocation occurs.
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roslibrust_common::ShapeShifter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    struct FakeRegistry {
        endpoint: String,
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn request_topic_endpoint(
            &self,
            _publisher_uri: &str,
        ) -> Result<String, crate::registry::RegistryError> {
            Ok(self.endpoint.clone())
        }

        async fn unregister(&self) -> Result<(), crate::registry::RegistryError> {
            Ok(())
        }
    }

    async fn read_header(stream: &mut TcpStream) -> std::collections::HashMap<String, String> {
        let len = stream.read_u32_le().await.unwrap();
        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body).await.unwrap();
        crate::tcpros::decode(&body).unwrap()
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut f = (payload.len() as u32).to_le_bytes().to_vec();
        f.extend_from_slice(payload);
        f
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct TestString {
        data: String,
    }

    impl RosMessageType for TestString {
        const ROS_TYPE_NAME: &'static str = "std_msgs/String";
        const MD5SUM: &'static str = "992ce8a1687cec8c8bd883ec73ca41d1";
        const DEFINITION: &'static str = "string data\n";
    }

    #[test_log::test(tokio::test)]
    async fn rejects_relative_topic_name() {
        let registry = Arc::new(FakeRegistry {
            endpoint: "127.0.0.1:1".to_string(),
        });
        let config = SubscriberConfig::new("/listener", registry);
        let result = Subscriber::<ShapeShifter>::new("not_absolute", config);
        assert!(matches!(result, Err(Error::InvalidName(_))));
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct NoMd5 {
        x: u8,
    }
    impl RosMessageType for NoMd5 {
        const ROS_TYPE_NAME: &'static str = "test_msgs/NoMd5";
    }

    #[test_log::test(tokio::test)]
    async fn rejects_message_type_with_no_md5sum() {
        let registry = Arc::new(FakeRegistry {
            endpoint: "127.0.0.1:1".to_string(),
        });
        let config = SubscriberConfig::new("/listener", registry);
        let result = Subscriber::<NoMd5>::new("/t", config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test_log::test(tokio::test)]
    async fn end_to_end_happy_path_delivers_messages_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let publisher = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let header = read_header(&mut stream).await;
            assert_eq!(header.get("topic"), Some(&"/t".to_string()));
            assert_eq!(
                header.get("md5sum"),
                Some(&"992ce8a1687cec8c8bd883ec73ca41d1".to_string())
            );
            let response = crate::tcpros::encode(&[
                ("type".to_string(), "std_msgs/String".to_string()),
                (
                    "md5sum".to_string(),
                    "992ce8a1687cec8c8bd883ec73ca41d1".to_string(),
                ),
                ("callerid".to_string(), "/talker".to_string()),
            ]);
            stream.write_all(&response).await.unwrap();
            for payload in ["a", "b", "c"] {
                let body = serde_rosmsg::to_vec(&TestString {
                    data: payload.to_string(),
                })
                .unwrap();
                stream.write_all(&frame(&body)).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let registry = Arc::new(FakeRegistry {
            endpoint: addr.to_string(),
        });
        let mut config = SubscriberConfig::new("/listener", registry);
        config.dial_timeout = Duration::from_secs(2);
        let subscriber = Subscriber::<TestString>::new("/t", config).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        subscriber
            .subscribe(move |msg: TestString| {
                received_clone.lock().unwrap().push(msg.data);
            })
            .await;

        subscriber
            .update_publishers(vec!["/talker".to_string()])
            .await;

        assert_eq!(subscriber.publisher_count().await, 1);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while received.lock().unwrap().len() < 3 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            *received.lock().unwrap(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );

        subscriber.shutdown().await;
        publisher.abort();
    }

    #[test_log::test(tokio::test)]
    async fn shutdown_stops_further_delivery() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let publisher = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_header(&mut stream).await;
            let response = crate::tcpros::encode(&[
                ("type".to_string(), "std_msgs/String".to_string()),
                (
                    "md5sum".to_string(),
                    "992ce8a1687cec8c8bd883ec73ca41d1".to_string(),
                ),
            ]);
            stream.write_all(&response).await.unwrap();
            // Keep sending after shutdown; none of it should reach the callback.
            for i in 0..5u32 {
                let body = serde_rosmsg::to_vec(&TestString {
                    data: format!("late-{i}"),
                })
                .unwrap();
                let _ = stream.write_all(&frame(&body)).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let registry = Arc::new(FakeRegistry {
            endpoint: addr.to_string(),
        });
        let mut config = SubscriberConfig::new("/listener", registry);
        config.dial_timeout = Duration::from_secs(2);
        let subscriber = Subscriber::<TestString>::new("/t", config).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        subscriber
            .subscribe(move |_msg: TestString| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        subscriber
            .update_publishers(vec!["/talker".to_string()])
            .await;

        // Give the connection a moment to reach Ready before tearing it down.
        tokio::time::sleep(Duration::from_millis(100)).await;
        subscriber.shutdown().await;

        let after_shutdown = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_shutdown);

        publisher.abort();
    }
}
