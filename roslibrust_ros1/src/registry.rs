//! The two XML-RPC calls a subscriber needs: `requestTopic` (sent to the *publisher's*
//! XML-RPC server, to learn its TCPROS endpoint) and `unregisterSubscriber` (sent to the
//! *master*, on shutdown). Bundled behind one trait so the Supervisor doesn't need to
//! know which remote party answers which call.

use async_trait::async_trait;
use log::*;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("transport error talking to {0}: {1}")]
    Transport(String, reqwest::Error),
    #[error("XML-RPC fault from {0}: {1}")]
    Fault(String, String),
    #[error("publisher at {0} offered an unsupported protocol {1} (only TCPROS is supported)")]
    UnsupportedProtocol(String, String),
    #[error("malformed XML-RPC response from {0}: {1}")]
    Malformed(String, String),
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Asks the publisher at `publisher_uri` (its own XML-RPC endpoint, learned
    /// out-of-band, e.g. from the master's advertised-publisher list) for the TCPROS
    /// endpoint to dial for this topic. Returns a `host:port` string.
    async fn request_topic_endpoint(&self, publisher_uri: &str) -> Result<String, RegistryError>;

    /// Tells the master this node is no longer subscribed to this topic.
    async fn unregister(&self) -> Result<(), RegistryError>;
}

/// A [`RegistryClient`] backed by real XML-RPC calls over HTTP.
pub struct XmlRpcRegistryClient {
    master_uri: String,
    node_name: String,
    topic: String,
    node_api_uri: String,
    http: reqwest::Client,
}

impl XmlRpcRegistryClient {
    pub fn new(
        master_uri: impl Into<String>,
        node_name: impl Into<String>,
        topic: impl Into<String>,
        node_api_uri: impl Into<String>,
    ) -> Self {
        Self {
            master_uri: master_uri.into(),
            node_name: node_name.into(),
            topic: topic.into(),
            node_api_uri: node_api_uri.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RegistryClient for XmlRpcRegistryClient {
    async fn request_topic_endpoint(&self, publisher_uri: &str) -> Result<String, RegistryError> {
        let body = serde_xmlrpc::request_to_string(
            "requestTopic",
            vec![
                self.node_name.clone().into(),
                self.topic.clone().into(),
                serde_xmlrpc::Value::Array(vec![serde_xmlrpc::Value::Array(vec![
                    "TCPROS".into()
                ])]),
            ],
        )
        .map_err(|e| RegistryError::Malformed(publisher_uri.to_string(), e.to_string()))?;

        let response = self
            .http
            .post(publisher_uri)
            .body(body)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(publisher_uri.to_string(), e))?;

        let response_text = response
            .text()
            .await
            .map_err(|e| RegistryError::Transport(publisher_uri.to_string(), e))?;

        let (code, status_message, (protocol, hostname, port)) = serde_xmlrpc::response_from_str::<(
            i32,
            String,
            (String, String, u16),
        )>(&response_text)
        .map_err(|e| RegistryError::Malformed(publisher_uri.to_string(), e.to_string()))?;

        if code != 1 {
            return Err(RegistryError::Fault(publisher_uri.to_string(), status_message));
        }
        if protocol != "TCPROS" {
            return Err(RegistryError::UnsupportedProtocol(
                publisher_uri.to_string(),
                protocol,
            ));
        }

        let endpoint = format!("{hostname}:{port}");
        trace!("publisher {publisher_uri} offered TCPROS endpoint {endpoint} for topic {}", self.topic);
        Ok(endpoint)
    }

    async fn unregister(&self) -> Result<(), RegistryError> {
        let body = serde_xmlrpc::request_to_string(
            "unregisterSubscriber",
            vec![
                self.node_name.clone().into(),
                self.topic.clone().into(),
                self.node_api_uri.clone().into(),
            ],
        )
        .map_err(|e| RegistryError::Malformed(self.master_uri.clone(), e.to_string()))?;

        let response = self
            .http
            .post(&self.master_uri)
            .body(body)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(self.master_uri.clone(), e))?;

        let response_text = response
            .text()
            .await
            .map_err(|e| RegistryError::Transport(self.master_uri.clone(), e))?;

        let (code, status_message, _count): (i32, String, i32) =
            serde_xmlrpc::response_from_str(&response_text)
                .map_err(|e| RegistryError::Malformed(self.master_uri.clone(), e.to_string()))?;

        if code != 1 {
            return Err(RegistryError::Fault(self.master_uri.clone(), status_message));
        }
        debug!("unregistered {} from topic {} with master", self.node_name, self.topic);
        Ok(())
    }
}
