//! HTTP client for the relay service

use crate::{PostReceipt, ROUND_TAG_HEADER, RelayError, Result};
use async_trait::async_trait;
use mpc_ceremony_core::{Message, PartyId, Relay};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// Relay client configuration
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Relay service URL
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl RelayClientConfig {
    /// Create a new config
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: 30,
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Relay client for HTTP communication
#[derive(Debug, Clone)]
pub struct RelayClient {
    base: Url,
    client: Client,
}

impl RelayClient {
    /// Create a new relay client
    pub fn new(config: RelayClientConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| RelayError::InvalidRequest(format!("relay url {}: {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(RelayError::InvalidRequest(format!(
                "relay url {} cannot carry a path",
                config.url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Network(e.to_string()))?;

        Ok(Self { base, client })
    }

    /// Create with default configuration
    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RelayClientConfig::new(url))
    }

    /// Build an endpoint URL, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn tagged(request: RequestBuilder, round_tag: Option<&str>) -> RequestBuilder {
        match round_tag {
            Some(tag) => request.header(ROUND_TAG_HEADER, tag),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))
    }

    /// Turn a non-success response into an error
    async fn check(response: Response, not_found: impl FnOnce() -> RelayError) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::BAD_REQUEST => RelayError::InvalidRequest(message),
            StatusCode::NOT_FOUND => not_found(),
            StatusCode::INSUFFICIENT_STORAGE => RelayError::StoreFull(message),
            _ => RelayError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }

    fn unexpected(status: StatusCode) -> RelayError {
        RelayError::Status {
            status: status.as_u16(),
            message: "unexpected response".to_string(),
        }
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Create a session or union participants into it
    pub async fn join_session(&self, session_id: &str, participants: &[PartyId]) -> Result<()> {
        let url = self.endpoint(&[session_id]);
        let response = Self::send(self.client.post(url).json(participants)).await?;
        Self::check(response, || Self::unexpected(StatusCode::NOT_FOUND)).await?;
        debug!(session_id, "Joined session");
        Ok(())
    }

    /// Participants of a session
    pub async fn participants(&self, session_id: &str) -> Result<Vec<PartyId>> {
        let url = self.endpoint(&[session_id]);
        let response = Self::send(self.client.get(url)).await?;
        let response = Self::check(response, || {
            RelayError::SessionNotFound(session_id.to_string())
        })
        .await?;

        response
            .json()
            .await
            .map_err(|e| RelayError::Serialization(e.to_string()))
    }

    /// Delete a session and its start signal
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let url = self.endpoint(&[session_id]);
        let response = Self::send(self.client.delete(url)).await?;
        Self::check(response, || Self::unexpected(StatusCode::NOT_FOUND)).await?;
        Ok(())
    }

    // ========================================================================
    // Start Gate
    // ========================================================================

    /// Publish the committee
    pub async fn start_session(&self, session_id: &str, committee: &[PartyId]) -> Result<()> {
        let url = self.endpoint(&["start", session_id]);
        let response = Self::send(self.client.post(url).json(committee)).await?;
        Self::check(response, || Self::unexpected(StatusCode::NOT_FOUND)).await?;
        debug!(session_id, "Started session");
        Ok(())
    }

    /// Committee of the start signal
    pub async fn start_committee(&self, session_id: &str) -> Result<Vec<PartyId>> {
        let url = self.endpoint(&["start", session_id]);
        let response = Self::send(self.client.get(url)).await?;
        let response = Self::check(response, || {
            RelayError::StartNotFound(session_id.to_string())
        })
        .await?;

        response
            .json()
            .await
            .map_err(|e| RelayError::Serialization(e.to_string()))
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Post a message to every recipient in `message.to`
    ///
    /// A 507 answer carries the receipt; it becomes `RelayError::Dropped`
    /// naming the recipients whose copy was not stored.
    pub async fn post_message(
        &self,
        session_id: &str,
        round_tag: Option<&str>,
        message: &Message,
    ) -> Result<()> {
        let url = self.endpoint(&["message", session_id]);
        let request = Self::tagged(self.client.post(url).json(message), round_tag);
        let response = Self::send(request).await?;

        if response.status() == StatusCode::INSUFFICIENT_STORAGE {
            let recipients = match response.json::<PostReceipt>().await {
                Ok(receipt) => receipt.dropped,
                Err(_) => message.to.clone(),
            };
            return Err(RelayError::Dropped {
                hash: message.hash.clone(),
                recipients,
            });
        }

        Self::check(response, || Self::unexpected(StatusCode::NOT_FOUND)).await?;
        Ok(())
    }

    /// Messages waiting for `recipient`
    pub async fn get_messages(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
    ) -> Result<Vec<Message>> {
        let url = self.endpoint(&["message", session_id, recipient]);
        let request = Self::tagged(self.client.get(url), round_tag);
        let response = Self::send(request).await?;
        let response = Self::check(response, || Self::unexpected(StatusCode::NOT_FOUND)).await?;

        response
            .json()
            .await
            .map_err(|e| RelayError::Serialization(e.to_string()))
    }

    /// Acknowledge one message copy
    pub async fn delete_message(
        &self,
        session_id: &str,
        recipient: &str,
        hash: &str,
        round_tag: Option<&str>,
    ) -> Result<()> {
        let url = self.endpoint(&["message", session_id, recipient, hash]);
        let request = Self::tagged(self.client.delete(url), round_tag);
        let response = Self::send(request).await?;
        Self::check(response, || Self::unexpected(StatusCode::NOT_FOUND)).await?;
        Ok(())
    }
}

#[async_trait]
impl Relay for RelayClient {
    async fn join_session(
        &self,
        session_id: &str,
        participants: &[String],
    ) -> mpc_ceremony_core::Result<()> {
        Ok(RelayClient::join_session(self, session_id, participants).await?)
    }

    async fn participants(&self, session_id: &str) -> mpc_ceremony_core::Result<Vec<String>> {
        Ok(RelayClient::participants(self, session_id).await?)
    }

    async fn delete_session(&self, session_id: &str) -> mpc_ceremony_core::Result<()> {
        Ok(RelayClient::delete_session(self, session_id).await?)
    }

    async fn start_session(
        &self,
        session_id: &str,
        committee: &[String],
    ) -> mpc_ceremony_core::Result<()> {
        Ok(RelayClient::start_session(self, session_id, committee).await?)
    }

    async fn start_committee(&self, session_id: &str) -> mpc_ceremony_core::Result<Vec<String>> {
        Ok(RelayClient::start_committee(self, session_id).await?)
    }

    async fn post_message(
        &self,
        session_id: &str,
        round_tag: Option<&str>,
        message: &Message,
    ) -> mpc_ceremony_core::Result<()> {
        Ok(RelayClient::post_message(self, session_id, round_tag, message).await?)
    }

    async fn get_messages(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
    ) -> mpc_ceremony_core::Result<Vec<Message>> {
        Ok(RelayClient::get_messages(self, session_id, recipient, round_tag).await?)
    }

    async fn delete_message(
        &self,
        session_id: &str,
        recipient: &str,
        hash: &str,
        round_tag: Option<&str>,
    ) -> mpc_ceremony_core::Result<()> {
        Ok(RelayClient::delete_message(self, session_id, recipient, hash, round_tag).await?)
    }
}
