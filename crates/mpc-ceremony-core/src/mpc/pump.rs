//! Polling pump that feeds relayed messages into the engine
//!
//! The relay is pull-based and the engine is push-based. A `MessagePump`
//! owns a background task that, on every tick, fetches the messages waiting
//! for the local participant, hands each new one to the engine and then
//! acknowledges it by deleting it from the relay.
//!
//! The relay never expires messages, so a message that was handed off but
//! whose acknowledgement failed is returned again on the next tick; the pump
//! remembers delivered hashes and only retries the acknowledgement.

use super::Relay;
use crate::engine::TssEngine;
use crate::{Message, PartyId, RoundTag, SessionId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Pump configuration
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Delay between two polls of the relay
    pub poll_interval: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl PumpConfig {
    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Handle to a running pump
pub struct MessagePump {
    session_id: SessionId,
    local_party_id: PartyId,
    round_tag: Option<RoundTag>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct PumpTask<R: ?Sized, E: ?Sized> {
    relay: Arc<R>,
    engine: Arc<E>,
    session_id: SessionId,
    local_party_id: PartyId,
    round_tag: Option<RoundTag>,
    config: PumpConfig,
}

impl MessagePump {
    /// Spawn a pump for `local_party_id` in `session_id`
    pub fn start<R, E>(
        relay: Arc<R>,
        engine: Arc<E>,
        session_id: impl Into<SessionId>,
        local_party_id: impl Into<PartyId>,
        round_tag: Option<RoundTag>,
        config: PumpConfig,
    ) -> Self
    where
        R: Relay + ?Sized + 'static,
        E: TssEngine + ?Sized + 'static,
    {
        let session_id = session_id.into();
        let local_party_id = local_party_id.into();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = PumpTask {
            relay,
            engine,
            session_id: session_id.clone(),
            local_party_id: local_party_id.clone(),
            round_tag: round_tag.clone(),
            config,
        };

        info!(
            session_id = %session_id,
            party = %local_party_id,
            round_tag = ?round_tag,
            "Starting message pump"
        );

        let handle = tokio::spawn(task.run(shutdown_rx));

        Self {
            session_id,
            local_party_id,
            round_tag,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Round tag this pump polls
    pub fn round_tag(&self) -> Option<&str> {
        self.round_tag.as_deref()
    }

    /// Stop polling
    ///
    /// Safe to call any number of times. Once it returns the background task
    /// has finished, so no further relay call is made.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let mut handle = self.handle.lock().await;
        if let Some(task) = handle.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(session_id = %self.session_id, "Message pump panicked");
                }
            }
            info!(
                session_id = %self.session_id,
                party = %self.local_party_id,
                "Message pump stopped"
            );
        }
    }

    /// Check if the background task is still running
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for MessagePump {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

impl<R, E> PumpTask<R, E>
where
    R: Relay + ?Sized,
    E: TssEngine + ?Sized,
{
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut delivered = HashSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            // An in-flight relay call is dropped as soon as shutdown is signalled
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = self.drain(&mut delivered) => {}
            }
        }
    }

    async fn drain(&self, delivered: &mut HashSet<String>) {
        let messages = match self
            .relay
            .get_messages(
                &self.session_id,
                &self.local_party_id,
                self.round_tag.as_deref(),
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    party = %self.local_party_id,
                    error = %e,
                    "Failed to fetch messages, retrying next tick"
                );
                return;
            }
        };

        for message in messages {
            if delivered.contains(&message.hash) {
                self.acknowledge(&message).await;
                continue;
            }

            let payload = match message.decode_body() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(
                        session_id = %self.session_id,
                        from = %message.from,
                        hash = %message.hash,
                        error = %e,
                        "Skipping undecodable message"
                    );
                    continue;
                }
            };

            if let Err(e) = self.engine.apply_data(&payload) {
                warn!(
                    session_id = %self.session_id,
                    from = %message.from,
                    hash = %message.hash,
                    error = %e,
                    "Engine refused message, retrying next tick"
                );
                continue;
            }

            debug!(
                session_id = %self.session_id,
                from = %message.from,
                hash = %message.hash,
                "Delivered message"
            );
            delivered.insert(message.hash.clone());
            self.acknowledge(&message).await;
        }
    }

    async fn acknowledge(&self, message: &Message) {
        if let Err(e) = self
            .relay
            .delete_message(
                &self.session_id,
                &self.local_party_id,
                &message.hash,
                self.round_tag.as_deref(),
            )
            .await
        {
            warn!(
                session_id = %self.session_id,
                hash = %message.hash,
                error = %e,
                "Failed to acknowledge message"
            );
        }
    }
}
