//! Relay communication for ceremony clients
//!
//! The `Relay` trait abstracts the store-and-forward relay that participants
//! use to reach each other. The HTTP client and the in-process relay service
//! both implement it, so the pump and orchestrator run unchanged against
//! either.

use crate::{Message, Result};
use std::time::Duration;

pub use async_trait::async_trait;

pub mod memory;
pub mod messenger;
pub mod pump;

pub use memory::{MemoryRelay, RelayCall};
pub use messenger::RelayMessenger;
pub use pump::{MessagePump, PumpConfig};

/// Store-and-forward relay operations
///
/// Identifiers are trimmed by the relay. `round_tag` namespaces messages so
/// that concurrent sub-ceremonies sharing a session never see each other's
/// traffic; `None` is its own namespace, distinct from every tag.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Create the session or union `participants` into it
    async fn join_session(&self, session_id: &str, participants: &[String]) -> Result<()>;

    /// Participants that joined the session
    ///
    /// Fails with `Error::SessionNotFound` if nobody joined yet.
    async fn participants(&self, session_id: &str) -> Result<Vec<String>>;

    /// Delete the session and its start signal
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Publish the committee that starts the ceremony
    async fn start_session(&self, session_id: &str, committee: &[String]) -> Result<()>;

    /// Committee published by `start_session`
    ///
    /// Fails with `Error::StartNotFound` until the session is started.
    async fn start_committee(&self, session_id: &str) -> Result<Vec<String>>;

    /// Post one message to every recipient in `message.to`
    async fn post_message(
        &self,
        session_id: &str,
        round_tag: Option<&str>,
        message: &Message,
    ) -> Result<()>;

    /// All messages waiting for `recipient`, in no particular order
    async fn get_messages(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
    ) -> Result<Vec<Message>>;

    /// Acknowledge (delete) one message; absent messages are not an error
    async fn delete_message(
        &self,
        session_id: &str,
        recipient: &str,
        hash: &str,
        round_tag: Option<&str>,
    ) -> Result<()>;
}

/// Extension trait with polling helpers for session setup
#[async_trait]
pub trait RelayExt: Relay {
    /// Poll until the session is started and return the committee
    async fn wait_for_start(
        &self,
        session_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Vec<String>>;

    /// Poll until every `expected` participant has joined
    async fn wait_for_participants(
        &self,
        session_id: &str,
        expected: &[String],
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Vec<String>>;
}

#[async_trait]
impl<R: Relay + ?Sized> RelayExt for R {
    async fn wait_for_start(
        &self,
        session_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let wait = async {
            loop {
                match self.start_committee(session_id).await {
                    Ok(committee) => return Ok(committee),
                    Err(e) if e.is_not_found() || e.is_transient() => {
                        tracing::debug!(session_id, error = %e, "Session not started yet");
                    }
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| crate::Error::Timeout(format!("start of session {}", session_id)))?
    }

    async fn wait_for_participants(
        &self,
        session_id: &str,
        expected: &[String],
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let wait = async {
            loop {
                match self.participants(session_id).await {
                    Ok(joined) if expected.iter().all(|p| joined.contains(p)) => {
                        return Ok(joined);
                    }
                    Ok(joined) => {
                        tracing::debug!(
                            session_id,
                            joined = joined.len(),
                            expected = expected.len(),
                            "Waiting for participants"
                        );
                    }
                    Err(e) if e.is_not_found() || e.is_transient() => {}
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            crate::Error::Timeout(format!("participants of session {}", session_id))
        })?
    }
}
