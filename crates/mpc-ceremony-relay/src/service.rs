//! Relay service operations
//!
//! `RelayService` owns a `RelayStore` and implements the relay operations on
//! top of it: identifier validation, fan-out of multi-recipient posts and
//! bookkeeping. The HTTP handlers are thin wrappers around it, and it also
//! implements the client-side `Relay` trait so ceremonies can run against an
//! in-process relay.

use crate::store::{JoinOutcome, RelayStore};
use crate::{RelayError, Result};
use async_trait::async_trait;
use mpc_ceremony_core::{Message, PartyId, Relay};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Relay counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Sessions created by a first join
    pub sessions_created: u64,
    /// Sessions deleted
    pub sessions_deleted: u64,
    /// Start signals published
    pub sessions_started: u64,
    /// Message copies stored
    pub messages_stored: u64,
    /// Message copies dropped for lack of room
    pub messages_dropped: u64,
    /// Message copies acknowledged
    pub messages_acknowledged: u64,
}

/// Per-recipient result of a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    /// Message hash
    pub hash: String,
    /// Recipients whose copy was stored
    pub stored: Vec<PartyId>,
    /// Recipients whose copy did not fit
    pub dropped: Vec<PartyId>,
}

impl PostReceipt {
    /// Check if every copy was stored
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// In-process relay
pub struct RelayService {
    store: RelayStore,
    stats: RwLock<RelayStats>,
}

/// Trim an identifier, rejecting empty ones
fn clean_id<'a>(kind: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RelayError::InvalidRequest(format!("{} is empty", kind)));
    }
    Ok(trimmed)
}

/// Trim an optional round tag; a blank tag is no tag
fn clean_tag(round_tag: Option<&str>) -> Option<&str> {
    round_tag.map(str::trim).filter(|t| !t.is_empty())
}

fn clean_parties(parties: &[PartyId]) -> Vec<PartyId> {
    parties
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

impl RelayService {
    /// Create a service whose store holds at most `max_entries` records
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: RelayStore::new(max_entries),
            stats: RwLock::new(RelayStats::default()),
        }
    }

    /// Get a reference to the store
    pub fn store(&self) -> &RelayStore {
        &self.store
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> RelayStats {
        self.stats.read().clone()
    }

    /// Create a session or union participants into it
    pub fn join_session(&self, session_id: &str, participants: &[PartyId]) -> Result<JoinOutcome> {
        let session_id = clean_id("session id", session_id)?;
        let participants = clean_parties(participants);

        let outcome = self
            .store
            .join(session_id, &participants)
            .ok_or_else(|| RelayError::StoreFull(format!("cannot create session {}", session_id)))?;

        if outcome == JoinOutcome::Created {
            self.stats.write().sessions_created += 1;
            info!(session_id, participants = ?participants, "Session created");
        } else {
            debug!(session_id, participants = ?participants, "Participants merged");
        }

        Ok(outcome)
    }

    /// Participants of a session
    pub fn participants(&self, session_id: &str) -> Result<Vec<PartyId>> {
        let session_id = clean_id("session id", session_id)?;
        self.store
            .participants(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))
    }

    /// Delete a session and its start signal
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let session_id = clean_id("session id", session_id)?;
        if self.store.remove_session(session_id) {
            self.stats.write().sessions_deleted += 1;
            info!(session_id, "Session deleted");
        }
        Ok(())
    }

    /// Publish the committee, replacing any previous start signal
    pub fn start_session(&self, session_id: &str, committee: &[PartyId]) -> Result<()> {
        let session_id = clean_id("session id", session_id)?;
        let committee = clean_parties(committee);

        if !self.store.set_start(session_id, committee.clone()) {
            return Err(RelayError::StoreFull(format!(
                "cannot start session {}",
                session_id
            )));
        }

        self.stats.write().sessions_started += 1;
        info!(session_id, committee = ?committee, "Session started");
        Ok(())
    }

    /// Committee of the start signal
    pub fn start_committee(&self, session_id: &str) -> Result<Vec<PartyId>> {
        let session_id = clean_id("session id", session_id)?;
        self.store
            .start(session_id)
            .ok_or_else(|| RelayError::StartNotFound(session_id.to_string()))
    }

    /// Store one copy of `message` per recipient
    ///
    /// Copies are independent: when the store fills up part way, the copies
    /// already stored stay and the rest are reported as dropped.
    pub fn post_message(
        &self,
        session_id: &str,
        round_tag: Option<&str>,
        mut message: Message,
    ) -> Result<PostReceipt> {
        let session_id = clean_id("session id", session_id)?;
        let round_tag = clean_tag(round_tag);
        let hash = clean_id("message hash", &message.hash)?.to_string();
        let mut recipients = clean_parties(&message.to);
        let mut seen = HashSet::new();
        recipients.retain(|r| seen.insert(r.clone()));

        message.session_id = session_id.to_string();
        message.hash = hash.clone();

        let mut receipt = PostReceipt {
            hash,
            stored: Vec::with_capacity(recipients.len()),
            dropped: Vec::new(),
        };

        for recipient in recipients {
            if self
                .store
                .put_message(session_id, &recipient, round_tag, message.clone())
            {
                receipt.stored.push(recipient);
            } else {
                receipt.dropped.push(recipient);
            }
        }

        {
            let mut stats = self.stats.write();
            stats.messages_stored += receipt.stored.len() as u64;
            stats.messages_dropped += receipt.dropped.len() as u64;
        }

        if receipt.is_complete() {
            debug!(
                session_id,
                round_tag = ?round_tag,
                from = %message.from,
                hash = %receipt.hash,
                recipients = receipt.stored.len(),
                "Message stored"
            );
        } else {
            warn!(
                session_id,
                hash = %receipt.hash,
                dropped = ?receipt.dropped,
                "Store full, message copies dropped"
            );
        }

        Ok(receipt)
    }

    /// Messages waiting for `recipient` under exactly `round_tag`
    pub fn get_messages(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
    ) -> Result<Vec<Message>> {
        let session_id = clean_id("session id", session_id)?;
        let recipient = clean_id("participant", recipient)?;
        Ok(self
            .store
            .messages(session_id, recipient, clean_tag(round_tag)))
    }

    /// Acknowledge one message copy; absent copies are not an error
    pub fn delete_message(
        &self,
        session_id: &str,
        recipient: &str,
        hash: &str,
        round_tag: Option<&str>,
    ) -> Result<()> {
        let session_id = clean_id("session id", session_id)?;
        let recipient = clean_id("participant", recipient)?;
        let hash = clean_id("message hash", hash)?;

        if self
            .store
            .remove_message(session_id, recipient, clean_tag(round_tag), hash)
        {
            self.stats.write().messages_acknowledged += 1;
            debug!(session_id, recipient, hash, "Message acknowledged");
        }
        Ok(())
    }

    /// Wipe the store, returning how many records were removed
    pub fn clear(&self) -> usize {
        let removed = self.store.clear();
        info!(removed, "Relay store cleared");
        removed
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl Relay for RelayService {
    async fn join_session(
        &self,
        session_id: &str,
        participants: &[String],
    ) -> mpc_ceremony_core::Result<()> {
        RelayService::join_session(self, session_id, participants)?;
        Ok(())
    }

    async fn participants(&self, session_id: &str) -> mpc_ceremony_core::Result<Vec<String>> {
        Ok(RelayService::participants(self, session_id)?)
    }

    async fn delete_session(&self, session_id: &str) -> mpc_ceremony_core::Result<()> {
        Ok(RelayService::delete_session(self, session_id)?)
    }

    async fn start_session(
        &self,
        session_id: &str,
        committee: &[String],
    ) -> mpc_ceremony_core::Result<()> {
        Ok(RelayService::start_session(self, session_id, committee)?)
    }

    async fn start_committee(&self, session_id: &str) -> mpc_ceremony_core::Result<Vec<String>> {
        Ok(RelayService::start_committee(self, session_id)?)
    }

    async fn post_message(
        &self,
        session_id: &str,
        round_tag: Option<&str>,
        message: &Message,
    ) -> mpc_ceremony_core::Result<()> {
        let receipt = RelayService::post_message(self, session_id, round_tag, message.clone())?;
        if receipt.is_complete() {
            Ok(())
        } else {
            Err(RelayError::Dropped {
                hash: receipt.hash,
                recipients: receipt.dropped,
            }
            .into())
        }
    }

    async fn get_messages(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
    ) -> mpc_ceremony_core::Result<Vec<Message>> {
        Ok(RelayService::get_messages(
            self, session_id, recipient, round_tag,
        )?)
    }

    async fn delete_message(
        &self,
        session_id: &str,
        recipient: &str,
        hash: &str,
        round_tag: Option<&str>,
    ) -> mpc_ceremony_core::Result<()> {
        Ok(RelayService::delete_message(
            self, session_id, recipient, hash, round_tag,
        )?)
    }
}
