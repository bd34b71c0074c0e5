//! The actor that owns a topic's subscription state: which publishers are known, which
//! ones have a live connection, and the callbacks registered against received messages.
//! All mutation happens serialized through one command channel so the reconciliation
//! logic never races against a disconnect or a callback registration.

use crate::connection::{self, CloseReason, ConnectionParams, ConnectionState};
use crate::dispatch::{make_dispatch_job, Callback};
use crate::job_runner::JobQueue;
use crate::registry::RegistryClient;
use crate::types::{MessageEvent, PublisherRef, TopicSpec};
use abort_on_drop::ChildTask;
use log::*;
use roslibrust_common::RosMessageType;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

pub(crate) enum Command<T> {
    UpdatePublishers(Vec<String>),
    AddCallback(Callback<T>),
    SetEnabled(bool),
    PublisherCount(oneshot::Sender<usize>),
    ConnectionState(String, oneshot::Sender<Option<ConnectionState>>),
    Shutdown(oneshot::Sender<()>),
}

/// A cheaply-cloneable handle to a running Supervisor.
pub(crate) struct SupervisorHandle<T> {
    commands: mpsc::Sender<Command<T>>,
}

impl<T> Clone for SupervisorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<T: Send + 'static> SupervisorHandle<T> {
    pub(crate) async fn update_publishers(&self, publisher_uris: Vec<String>) {
        let _ = self
            .commands
            .send(Command::UpdatePublishers(publisher_uris))
            .await;
    }

    pub(crate) async fn add_callback(&self, callback: Callback<T>) {
        let _ = self.commands.send(Command::AddCallback(callback)).await;
    }

    pub(crate) async fn set_enabled(&self, enabled: bool) {
        let _ = self.commands.send(Command::SetEnabled(enabled)).await;
    }

    pub(crate) async fn publisher_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::PublisherCount(tx)).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// The current [`ConnectionState`] of the Connection owned for `publisher_uri`, or
    /// `None` if no Connection is currently tracked for it (never started, or already
    /// torn down).
    pub(crate) async fn connection_state(&self, publisher_uri: &str) -> Option<ConnectionState> {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::ConnectionState(publisher_uri.to_string(), tx))
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub(crate) async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// A publisher the Supervisor currently owns a live Connection task for.
struct ActiveConnection {
    publisher: PublisherRef,
    state: watch::Receiver<ConnectionState>,
    _task: ChildTask<()>,
}

pub(crate) struct SupervisorConfig {
    pub topic: TopicSpec,
    pub caller_id: String,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub delivery_budget: Duration,
    pub job_budget: Duration,
    pub registry: Arc<dyn RegistryClient>,
    pub job_queue: Arc<dyn JobQueue>,
}

/// Spawns the Supervisor actor task and returns a handle plus a `ChildTask` that, when
/// dropped, aborts the actor (and with it, every connection it owns).
pub(crate) fn spawn<T>(config: SupervisorConfig) -> (SupervisorHandle<T>, ChildTask<()>)
where
    T: RosMessageType + Clone + Send + Sync + 'static,
{
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let handle = SupervisorHandle {
        commands: commands_tx,
    };
    let task = tokio::spawn(run(config, commands_rx));
    (handle, task.into())
}

async fn run<T>(config: SupervisorConfig, mut commands: mpsc::Receiver<Command<T>>)
where
    T: RosMessageType + Clone + Send + Sync + 'static,
{
    let topic = config.topic.name.clone();
    let mut known_publishers: HashSet<String> = HashSet::new();
    let mut active: HashMap<String, ActiveConnection> = HashMap::new();
    let mut callbacks: Arc<[Callback<T>]> = Arc::from(Vec::new());
    let (enabled_tx, enabled_rx) = watch::channel(true);

    let (events_tx, mut events_rx) = mpsc::channel::<MessageEvent>(64);
    let (closed_tx, mut closed_rx) = mpsc::channel::<(String, CloseReason)>(64);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("all handles for topic {topic} dropped, shutting down supervisor");
                    break;
                };
                match command {
                    Command::UpdatePublishers(publisher_uris) => {
                        reconcile(
                            &config,
                            &topic,
                            publisher_uris,
                            &mut known_publishers,
                            &mut active,
                            enabled_rx.clone(),
                            events_tx.clone(),
                            closed_tx.clone(),
                        )
                        .await;
                    }
                    Command::AddCallback(callback) => {
                        let mut next: Vec<Callback<T>> = callbacks.iter().cloned().collect();
                        next.push(callback);
                        callbacks = Arc::from(next);
                    }
                    Command::SetEnabled(enabled) => {
                        let _ = enabled_tx.send(enabled);
                    }
                    Command::PublisherCount(reply) => {
                        let _ = reply.send(active.len());
                    }
                    Command::ConnectionState(publisher_uri, reply) => {
                        let state = active.get(&publisher_uri).map(|entry| *entry.state.borrow());
                        let _ = reply.send(state);
                    }
                    Command::Shutdown(ack) => {
                        debug!("shutting down supervisor for topic {topic}");
                        // Fired and forgotten: unregistering with the master must not hold
                        // up a prompt shutdown if the master is slow or unreachable.
                        let registry = config.registry.clone();
                        tokio::spawn(async move {
                            if let Err(e) = registry.unregister().await {
                                warn!("unregister failed during shutdown: {e}");
                            }
                        });
                        active.clear();
                        let _ = ack.send(());
                        break;
                    }
                }
            }
            Some((publisher_uri, reason)) = closed_rx.recv() => {
                // Deliberately does not touch `known_publishers`: per the reconciliation
                // design, that set is only ever replaced wholesale in response to a new
                // advertised-publisher list, never trimmed here. A publisher that drops
                // and comes back without the list changing will not be reconnected to
                // until it next appears in an `UpdatePublishers` call.
                debug!("connection to {publisher_uri} on topic {topic} closed: {reason:?}");
                active.remove(&publisher_uri);
            }
            Some(event) = events_rx.recv() => {
                if !*enabled_rx.borrow() {
                    continue;
                }
                if callbacks.is_empty() {
                    continue;
                }
                let job = make_dispatch_job(event, callbacks.clone());
                if !config.job_queue.try_enqueue(job, config.job_budget).await {
                    warn!("dropped a message on topic {topic}: job queue did not accept it within budget");
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn reconcile<T>(
    config: &SupervisorConfig,
    topic: &str,
    publisher_uris: Vec<String>,
    known_publishers: &mut HashSet<String>,
    active: &mut HashMap<String, ActiveConnection>,
    enabled_rx: watch::Receiver<bool>,
    events_tx: mpsc::Sender<MessageEvent>,
    closed_tx: mpsc::Sender<(String, CloseReason)>,
) where
    T: RosMessageType + Send + Sync + 'static,
{
    let incoming: HashSet<String> = publisher_uris.into_iter().collect();
    let dead: Vec<String> = known_publishers.difference(&incoming).cloned().collect();
    let new: Vec<String> = incoming.difference(known_publishers).cloned().collect();

    for publisher_uri in &dead {
        if let Some(entry) = active.remove(publisher_uri) {
            debug!(
                "dropping connection to {publisher_uri} (endpoint {}) on topic {topic}: no longer advertised",
                entry.publisher.endpoint
            );
        }
    }

    for publisher_uri in new {
        match config.registry.request_topic_endpoint(&publisher_uri).await {
            Ok(endpoint) => {
                let (state_tx, state_rx) = watch::channel(ConnectionState::Dialing);
                let params = ConnectionParams {
                    publisher_name: publisher_uri.clone(),
                    endpoint: endpoint.clone(),
                    topic: config.topic.name.clone(),
                    message_type: config.topic.message_type.clone(),
                    md5sum: config.topic.md5sum.clone(),
                    caller_id: config.caller_id.clone(),
                    dial_timeout: config.dial_timeout,
                    read_timeout: config.read_timeout,
                    delivery_budget: config.delivery_budget,
                    enabled: enabled_rx.clone(),
                    events: events_tx.clone(),
                    closed: closed_tx.clone(),
                    state: state_tx,
                };
                let task = tokio::spawn(connection::run(params));
                active.insert(
                    publisher_uri.clone(),
                    ActiveConnection {
                        publisher: PublisherRef {
                            name: publisher_uri,
                            endpoint,
                        },
                        state: state_rx,
                        _task: task.into(),
                    },
                );
            }
            Err(e) => {
                warn!("could not resolve TCPROS endpoint for publisher {publisher_uri} on topic {topic}: {e}");
            }
        }
    }

    // Replace wholesale, even for publishers whose endpoint resolution just failed above:
    // they are now considered known, and will only be retried once they disappear and
    // reappear in a future advertised list.
    *known_publishers = incoming;
}
