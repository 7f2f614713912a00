//! In-memory relay store
//!
//! Every record lives under one structured key: the session id plus a slot
//! saying which kind of record it is. Keys are compared field by field, so
//! an identifier containing `-` or any other character can never alias
//! another key.
//!
//! Message copies are also indexed by inbox (session, recipient and round
//! tag), so a poll only visits the copies addressed to the poller.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use mpc_ceremony_core::{Message, PartyId, RoundTag, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Which record of a session a key addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Participant record
    Session,
    /// Start signal
    Start,
    /// One recipient's copy of a message
    Message {
        recipient: PartyId,
        round_tag: Option<RoundTag>,
        hash: String,
    },
}

/// Structured store key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub session_id: SessionId,
    pub slot: Slot,
}

impl EntryKey {
    /// Key of the participant record
    pub fn session(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            slot: Slot::Session,
        }
    }

    /// Key of the start signal
    pub fn start(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            slot: Slot::Start,
        }
    }

    /// Key of one recipient's copy of a message
    pub fn message(
        session_id: impl Into<SessionId>,
        recipient: impl Into<PartyId>,
        round_tag: Option<RoundTag>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            slot: Slot::Message {
                recipient: recipient.into(),
                round_tag,
                hash: hash.into(),
            },
        }
    }
}

/// Participants of a session, in join order without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub participants: Vec<PartyId>,
}

impl SessionRecord {
    /// Union `participants` into the record, returning how many were new
    pub fn merge(&mut self, participants: &[PartyId]) -> usize {
        let before = self.participants.len();
        for party in participants {
            if !self.participants.contains(party) {
                self.participants.push(party.clone());
            }
        }
        self.participants.len() - before
    }
}

/// Committee that started a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSignal {
    pub committee: Vec<PartyId>,
}

/// A stored record
#[derive(Debug, Clone)]
pub enum Entry {
    Session(SessionRecord),
    Start(StartSignal),
    Message(Message),
}

/// Outcome of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The session did not exist
    Created,
    /// Participants were merged into an existing session
    Merged,
}

/// Where a recipient's copies for one round live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InboxKey {
    session_id: SessionId,
    recipient: PartyId,
    round_tag: Option<RoundTag>,
}

impl InboxKey {
    fn of(key: &EntryKey) -> Option<(Self, &str)> {
        match &key.slot {
            Slot::Message {
                recipient,
                round_tag,
                hash,
            } => Some((
                Self {
                    session_id: key.session_id.clone(),
                    recipient: recipient.clone(),
                    round_tag: round_tag.clone(),
                },
                hash.as_str(),
            )),
            _ => None,
        }
    }
}

/// Relay store bounded by an entry count
///
/// Lock order is always `entries` then `inboxes`.
pub struct RelayStore {
    entries: DashMap<EntryKey, Entry>,
    /// Hashes of the stored copies per inbox, in arrival order
    inboxes: DashMap<InboxKey, Vec<String>>,
    len: AtomicUsize,
    max_entries: usize,
}

impl RelayStore {
    /// Create a store that holds at most `max_entries` records
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            inboxes: DashMap::new(),
            len: AtomicUsize::new(0),
            max_entries,
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of records
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    // Claim room for one new record. Never touches the map, so it is safe to
    // call while holding a shard lock.
    fn reserve(&self) -> bool {
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_entries).then_some(n + 1)
            })
            .is_ok()
    }

    // Saturates at zero: a remove racing a clear must not wrap the count.
    fn release(&self) {
        let _ = self
            .len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Create the session or union participants into it
    ///
    /// Runs under the shard lock of the session key, so concurrent joins
    /// never lose an update. Returns `None` if a new session does not fit.
    pub fn join(&self, session_id: &str, participants: &[PartyId]) -> Option<JoinOutcome> {
        match self.entries.entry(EntryKey::session(session_id)) {
            MapEntry::Occupied(mut occupied) => {
                if let Entry::Session(record) = occupied.get_mut() {
                    record.merge(participants);
                }
                Some(JoinOutcome::Merged)
            }
            MapEntry::Vacant(vacant) => {
                if !self.reserve() {
                    return None;
                }
                let mut record = SessionRecord::default();
                record.merge(participants);
                vacant.insert(Entry::Session(record));
                Some(JoinOutcome::Created)
            }
        }
    }

    /// Participants of a session
    pub fn participants(&self, session_id: &str) -> Option<Vec<PartyId>> {
        match self.entries.get(&EntryKey::session(session_id)).as_deref() {
            Some(Entry::Session(record)) => Some(record.participants.clone()),
            _ => None,
        }
    }

    /// Store the start signal, replacing any previous one
    ///
    /// Returns `false` if a new signal does not fit.
    pub fn set_start(&self, session_id: &str, committee: Vec<PartyId>) -> bool {
        self.upsert(EntryKey::start(session_id), Entry::Start(StartSignal { committee }))
    }

    /// Committee of the start signal
    pub fn start(&self, session_id: &str) -> Option<Vec<PartyId>> {
        match self.entries.get(&EntryKey::start(session_id)).as_deref() {
            Some(Entry::Start(signal)) => Some(signal.committee.clone()),
            _ => None,
        }
    }

    /// Remove the participant record and start signal of a session
    ///
    /// Messages are left in place; they are removed only by acknowledgement
    /// or a full clear.
    pub fn remove_session(&self, session_id: &str) -> bool {
        let session = self.remove(&EntryKey::session(session_id));
        let start = self.remove(&EntryKey::start(session_id));
        session || start
    }

    /// Store one recipient's copy of a message
    ///
    /// A copy under the same key is replaced. Returns `false` if a new copy
    /// does not fit.
    pub fn put_message(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
        message: Message,
    ) -> bool {
        let key = EntryKey::message(
            session_id,
            recipient,
            round_tag.map(str::to_string),
            message.hash.clone(),
        );
        self.upsert(key, Entry::Message(message))
    }

    /// Every message copy for `recipient` under exactly `round_tag`
    pub fn messages(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
    ) -> Vec<Message> {
        let inbox = InboxKey {
            session_id: session_id.to_string(),
            recipient: recipient.to_string(),
            round_tag: round_tag.map(str::to_string),
        };
        let hashes = match self.inboxes.get(&inbox) {
            Some(hashes) => hashes.clone(),
            None => return Vec::new(),
        };

        hashes
            .into_iter()
            .filter_map(|hash| {
                let key = EntryKey::message(
                    inbox.session_id.as_str(),
                    inbox.recipient.as_str(),
                    inbox.round_tag.clone(),
                    hash,
                );
                match self.entries.get(&key).as_deref() {
                    Some(Entry::Message(message)) => Some(message.clone()),
                    _ => None,
                }
            })
            .collect()
    }

    /// Remove one recipient's copy of a message
    pub fn remove_message(
        &self,
        session_id: &str,
        recipient: &str,
        round_tag: Option<&str>,
        hash: &str,
    ) -> bool {
        self.remove(&EntryKey::message(
            session_id,
            recipient,
            round_tag.map(str::to_string),
            hash,
        ))
    }

    /// Drop every record, returning how many were removed
    pub fn clear(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.inboxes.clear();
        self.len.store(0, Ordering::Release);
        removed
    }

    fn upsert(&self, key: EntryKey, entry: Entry) -> bool {
        match self.entries.entry(key) {
            MapEntry::Occupied(mut occupied) => {
                occupied.insert(entry);
                true
            }
            MapEntry::Vacant(vacant) => {
                if !self.reserve() {
                    return false;
                }
                if let Some((inbox, hash)) = InboxKey::of(vacant.key()) {
                    self.inboxes.entry(inbox).or_default().push(hash.to_string());
                }
                vacant.insert(entry);
                true
            }
        }
    }

    fn remove(&self, key: &EntryKey) -> bool {
        match self.entries.entry(key.clone()) {
            MapEntry::Occupied(occupied) => {
                if let Some((inbox, hash)) = InboxKey::of(occupied.key()) {
                    if let MapEntry::Occupied(mut hashes) = self.inboxes.entry(inbox) {
                        hashes.get_mut().retain(|h| h != hash);
                        if hashes.get().is_empty() {
                            hashes.remove();
                        }
                    }
                }
                occupied.remove();
                self.release();
                true
            }
            MapEntry::Vacant(_) => false,
        }
    }

    /// Number of inboxes holding at least one copy
    pub fn inbox_count(&self) -> usize {
        self.inboxes.len()
    }
}

impl Default for RelayStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}
