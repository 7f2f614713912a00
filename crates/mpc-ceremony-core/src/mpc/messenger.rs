//! Relay-backed outbound messenger for the engine

use super::{Relay, async_trait};
use crate::engine::Messenger;
use crate::{Message, PartyId, Result, RoundTag, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Posts engine output to the relay under one session and round tag
pub struct RelayMessenger<R: Relay + ?Sized> {
    relay: Arc<R>,
    session_id: SessionId,
    round_tag: Option<RoundTag>,
    max_retries: u32,
    retry_delay: Duration,
}

impl<R: Relay + ?Sized> RelayMessenger<R> {
    /// Create a messenger for a session, optionally scoped to a round tag
    pub fn new(relay: Arc<R>, session_id: impl Into<SessionId>, round_tag: Option<RoundTag>) -> Self {
        Self {
            relay,
            session_id: session_id.into(),
            round_tag,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    /// Set how often a transient post failure is retried
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Round tag messages are posted under
    pub fn round_tag(&self) -> Option<&str> {
        self.round_tag.as_deref()
    }
}

#[async_trait]
impl<R: Relay + ?Sized> Messenger for RelayMessenger<R> {
    async fn send(&self, from: &str, to: &[PartyId], payload: &[u8]) -> Result<()> {
        let message = Message::new(self.session_id.clone(), from, to.to_vec(), payload);
        let mut attempt = 0;

        loop {
            match self
                .relay
                .post_message(&self.session_id, self.round_tag(), &message)
                .await
            {
                Ok(()) => {
                    debug!(
                        session_id = %self.session_id,
                        hash = %message.hash,
                        recipients = to.len(),
                        "Posted message"
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        session_id = %self.session_id,
                        hash = %message.hash,
                        attempt,
                        error = %e,
                        "Retrying message post"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
