//! A single TCPROS connection to one publisher: dial, handshake, then a read loop that
//! forwards frames to the Dispatcher until the peer disconnects or the connection is
//! told to shut down.

use crate::tcpros::{self, FrameError, HeaderError};
use crate::types::MessageEvent;
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

/// Where a connection is in its lifecycle, observable from outside the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Dialing,
    Handshaking,
    Ready,
    Closed,
}

#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("failed to connect to {endpoint}: {source}")]
    DialFailed {
        endpoint: String,
        source: std::io::Error,
    },
    #[error("dial to {0} timed out")]
    DialTimeout(String),
    #[error("failed to exchange connection header: {0}")]
    HeaderIoFailed(#[from] FrameError),
    #[error("malformed connection header: {0}")]
    MalformedHeader(#[from] HeaderError),
    #[error("publisher advertises type {publisher_type:?}/{publisher_md5sum:?}, expected {expected_type}/{expected_md5sum}")]
    IncompatibleType {
        expected_type: String,
        expected_md5sum: String,
        publisher_type: Option<String>,
        publisher_md5sum: Option<String>,
    },
}

/// Why a connection's read loop exited.
///
/// This is a diagnostic distinction only: the Supervisor handles every variant the same
/// way (drop the connection, do not immediately retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Resync,
    PeerGone,
    Fatal,
}

pub struct ConnectionParams {
    pub publisher_name: String,
    pub endpoint: String,
    pub topic: String,
    pub message_type: String,
    pub md5sum: String,
    pub caller_id: String,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub delivery_budget: Duration,
    pub enabled: watch::Receiver<bool>,
    pub events: mpsc::Sender<MessageEvent>,
    pub closed: mpsc::Sender<(String, CloseReason)>,
    pub state: watch::Sender<ConnectionState>,
}

/// Dials `params.endpoint`, performs the connection header handshake, then reads frames
/// until the peer disconnects. Intended to be run as an abortable task; cancellation at
/// any point (including mid-dial) is the caller's responsibility via task abort, not a
/// return value from this function.
pub async fn run(params: ConnectionParams) {
    let publisher_name = params.publisher_name.clone();
    match run_inner(&params).await {
        Ok(reason) => {
            let _ = params.state.send(ConnectionState::Closed);
            let _ = params.closed.send((publisher_name, reason)).await;
        }
        Err(e) => {
            warn!(
                "connection to publisher {} on topic {} failed before becoming ready: {e}",
                params.publisher_name, params.topic
            );
            let _ = params.state.send(ConnectionState::Closed);
            let _ = params
                .closed
                .send((publisher_name, CloseReason::Fatal))
                .await;
        }
    }
}

async fn run_inner(params: &ConnectionParams) -> Result<CloseReason, ConnectionError> {
    let _ = params.state.send(ConnectionState::Dialing);
    let mut stream = match tokio::time::timeout(
        params.dial_timeout,
        TcpStream::connect(&params.endpoint),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(ConnectionError::DialFailed {
                endpoint: params.endpoint.clone(),
                source,
            })
        }
        Err(_elapsed) => return Err(ConnectionError::DialTimeout(params.endpoint.clone())),
    };

    let _ = params.state.send(ConnectionState::Handshaking);
    let outbound = tcpros::encode(&[
        ("topic".to_string(), params.topic.clone()),
        ("type".to_string(), params.message_type.clone()),
        ("md5sum".to_string(), params.md5sum.clone()),
        ("callerid".to_string(), params.caller_id.clone()),
    ]);
    tokio::time::timeout(params.dial_timeout, stream.write_all(&outbound))
        .await
        .map_err(|_| ConnectionError::DialTimeout(params.endpoint.clone()))?
        .map_err(FrameError::Failed)?;

    let response = tcpros::read_frame(&mut stream, params.dial_timeout).await?;
    let mut response_header = tcpros::decode(&response)?;
    check_handshake(&params.message_type, &params.md5sum, &response_header)?;

    // Tolerance for partial publisher implementations that omit `topic` from the
    // response header: fill it in with what we asked for rather than leaving it absent.
    response_header
        .entry("topic".to_string())
        .or_insert_with(|| params.topic.clone());
    let headers = Arc::new(response_header);

    let _ = params.state.send(ConnectionState::Ready);
    debug!(
        "connection to publisher {} ready for topic {}",
        params.publisher_name, params.topic
    );

    Ok(read_loop(params, &mut stream, headers).await)
}

/// Checks a publisher's response header against what we asked for. "Exactly" per the
/// handshake contract, with one documented wildcard: a subscriber expecting "*" (the
/// ShapeShifter/AnyMsg convention) accepts any publisher type. A publisher claiming "*"
/// does not get the same leniency: a subscriber that asked for a concrete type still
/// requires the publisher to confirm that exact type and md5sum.
fn check_handshake(
    expected_type: &str,
    expected_md5sum: &str,
    response_header: &HashMap<String, String>,
) -> Result<(), ConnectionError> {
    let field_ok = |received: Option<&String>, expected: &str| {
        expected == "*" || received.map(|v| v == expected).unwrap_or(false)
    };
    let type_ok = field_ok(response_header.get("type"), expected_type);
    let md5_ok = field_ok(response_header.get("md5sum"), expected_md5sum);
    if type_ok && md5_ok {
        Ok(())
    } else {
        Err(ConnectionError::IncompatibleType {
            expected_type: expected_type.to_string(),
            expected_md5sum: expected_md5sum.to_string(),
            publisher_type: response_header.get("type").cloned(),
            publisher_md5sum: response_header.get("md5sum").cloned(),
        })
    }
}

async fn read_loop(
    params: &ConnectionParams,
    stream: &mut TcpStream,
    headers: Arc<HashMap<String, String>>,
) -> CloseReason {
    loop {
        let payload = match tcpros::read_frame(stream, params.read_timeout).await {
            Ok(payload) => payload,
            Err(FrameError::RemoteClosed) => return CloseReason::PeerGone,
            Err(FrameError::Timeout) | Err(FrameError::OutOfSync(_)) => return CloseReason::Resync,
            Err(FrameError::Failed(e)) => {
                debug!(
                    "connection to publisher {} on topic {} failed: {e}",
                    params.publisher_name, params.topic
                );
                return CloseReason::Fatal;
            }
        };

        if !*params.enabled.borrow() {
            trace!(
                "dropping message from publisher {} on topic {} (connection disabled)",
                params.publisher_name, params.topic
            );
            continue;
        }

        let event = MessageEvent {
            payload,
            receipt_time: SystemTime::now(),
            publisher: params.publisher_name.clone(),
            headers: headers.clone(),
        };
        if tokio::time::timeout(params.delivery_budget, params.events.send(event))
            .await
            .is_err()
        {
            trace!(
                "dropped message from publisher {} on topic {}: dispatcher not keeping up",
                params.publisher_name, params.topic
            );
        }
    }
}
