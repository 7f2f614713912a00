//! In-memory relay implementation for testing and local development

use super::{Relay, async_trait};
use crate::{Error, Message, PartyId, Result, RoundTag, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One call made against a `MemoryRelay`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCall {
    /// Operation name, e.g. `get_messages`
    pub op: &'static str,
    /// Session the call addressed
    pub session_id: SessionId,
    /// Round tag, for message operations
    pub round_tag: Option<RoundTag>,
}

type MessageKey = (SessionId, PartyId, Option<RoundTag>, String);

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<SessionId, Vec<PartyId>>,
    starts: HashMap<SessionId, Vec<PartyId>>,
    messages: HashMap<MessageKey, Message>,
    calls: Vec<RelayCall>,
    failing_gets: u32,
    failing_deletes: u32,
    failing_posts: u32,
}

/// In-memory relay for local testing
///
/// Behaves like the relay service for a single process and additionally
/// records every call and can inject transport failures. It's useful for:
/// - Unit and integration testing of the pump and orchestrator
/// - Single-process multi-party simulation
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    state: Arc<Mutex<State>>,
}

impl MemoryRelay {
    /// Create an empty relay
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, oldest first
    pub fn calls(&self) -> Vec<RelayCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Make the next `n` `get_messages` calls fail with a network error
    pub fn fail_gets(&self, n: u32) {
        self.state.lock().failing_gets = n;
    }

    /// Make the next `n` `delete_message` calls fail with a network error
    pub fn fail_deletes(&self, n: u32) {
        self.state.lock().failing_deletes = n;
    }

    /// Make the next `n` `post_message` calls fail with a network error
    pub fn fail_posts(&self, n: u32) {
        self.state.lock().failing_posts = n;
    }

    /// Number of stored message copies
    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Clear all records (useful for test cleanup)
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.sessions.clear();
        state.starts.clear();
        state.messages.clear();
    }

    fn record(state: &mut State, op: &'static str, session_id: &str, round_tag: Option<&str>) {
        state.calls.push(RelayCall {
            op,
            session_id: session_id.to_string(),
            round_tag: round_tag.map(str::to_string),
        });
    }

    fn injected(counter: &mut u32, op: &str) -> Result<()> {
        if *counter > 0 {
            *counter -= 1;
            return Err(Error::Network(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn join_session(&self, session_id: &str, participants: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        Self::record(&mut state, "join_session", session_id, None);

        let joined = state.sessions.entry(session_id.to_string()).or_default();
        for party in participants {
            if !joined.contains(party) {
                joined.push(party.clone());
            }
        }
        Ok(())
    }

    async fn participants(&self, session_id: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        Self::record(&mut state, "participants", session_id, None);

        state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::record(&mut state, "delete_session", session_id, None);

        state.sessions.remove(session_id);
        state.starts.remove(session_id);
        Ok(())
    }

    async fn start_session(&self, session_id: &str, committee: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        Self::record(&mut state, "start_session", session_id, None);

        state
            .starts
            .insert(session_id.to_string(), committee.to_vec());
        Ok(())
    }

    async fn start_committee(&self, session_id: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        Self::record(&mut state, "start_committee", session_id, None);

        state
            .starts
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::StartNotFound(session_id.to_string()))
    }

    async fn post_message(
        &self,
        session_id: &str,
        round_tag: Option<&str>,
        message: &Message,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::record(&mut state, "post_message", session_id, round_tag);
        Self::injected(&mut state.failing_posts, "post")?;

        for recipient in &message.to {
            let key = (
                session_id.to_string(),
                recipient.clone(),
                round_tag.map(str::to_string),
                message.hash.clone(),
            );
            state.messages.insert(key, message.clone());
        }
        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
    ) -> Result<Vec<Message>> {
        let mut state = self.state.lock();
        Self::record(&mut state, "get_messages", session_id, round_tag);
        Self::injected(&mut state.failing_gets, "get")?;

        Ok(state
            .messages
            .iter()
            .filter(|((s, r, t, _), _)| {
                s == session_id && r == recipient && t.as_deref() == round_tag
            })
            .map(|(_, message)| message.clone())
            .collect())
    }

    async fn delete_message(
        &self,
        session_id: &str,
        recipient: &str,
        hash: &str,
        round_tag: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::record(&mut state, "delete_message", session_id, round_tag);
        Self::injected(&mut state.failing_deletes, "delete")?;

        state.messages.remove(&(
            session_id.to_string(),
            recipient.to_string(),
            round_tag.map(str::to_string),
            hash.to_string(),
        ));
        Ok(())
    }
}
