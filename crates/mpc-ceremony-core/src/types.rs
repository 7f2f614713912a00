//! Core types for relayed key ceremonies
//!
//! Wire types exchanged with the relay (`Message`), the key-scheme
//! vocabulary shared by the orchestrator and the engine (`KeyType`,
//! `TssType`), and the ceremony output record (`Vault`).

use crate::{Error, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier of a ceremony session on the relay
pub type SessionId = String;

/// Identifier of a participant (device) in a session
pub type PartyId = String;

/// Scoping identifier carried in the `message_id` header
pub type RoundTag = String;

/// A protocol message relayed between participants
///
/// `body` is opaque to the relay: base64 text produced by the sending
/// engine. `hash` identifies the content and is part of the relay key, so two
/// different bodies must never share a hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Session the message belongs to
    #[serde(default)]
    pub session_id: SessionId,
    /// Sender
    pub from: PartyId,
    /// Recipients
    pub to: Vec<PartyId>,
    /// Opaque base64 payload
    pub body: String,
    /// Content hash (hex)
    pub hash: String,
}

impl Message {
    /// Build a message for `payload`, encoding the body and hashing it
    pub fn new(
        session_id: impl Into<SessionId>,
        from: impl Into<PartyId>,
        to: Vec<PartyId>,
        payload: &[u8],
    ) -> Self {
        let body = STANDARD.encode(payload);
        let hash = body_hash(&body);
        Self {
            session_id: session_id.into(),
            from: from.into(),
            to,
            body,
            hash,
        }
    }

    /// Decode the opaque body back into bytes
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.body.as_bytes())
            .map_err(|e| Error::InvalidMessage(format!("message {}: {}", self.hash, e)))
    }

    /// Check the hash still matches the body
    pub fn hash_matches(&self) -> bool {
        body_hash(&self.body) == self.hash
    }
}

/// Hex SHA-256 of a message body
pub fn body_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Signature algorithm a ceremony phase runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// secp256k1 ECDSA
    Ecdsa,
    /// ed25519 EdDSA
    Eddsa,
}

impl KeyType {
    /// Lowercase label used in round tags
    pub fn label(&self) -> &'static str {
        match self {
            KeyType::Ecdsa => "ecdsa",
            KeyType::Eddsa => "eddsa",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Ecdsa => write!(f, "ECDSA"),
            KeyType::Eddsa => write!(f, "EdDSA"),
        }
    }
}

/// Kind of ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TssType {
    /// Fresh key generation
    Keygen,
    /// Re-sharing an existing key to a new committee
    Reshare,
}

impl TssType {
    /// Lowercase label used in round tags
    pub fn label(&self) -> &'static str {
        match self {
            TssType::Keygen => "keygen",
            TssType::Reshare => "reshare",
        }
    }
}

impl fmt::Display for TssType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Key share produced by the engine for one public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    /// Public key the share belongs to
    pub pub_key: String,
    /// Opaque engine share data
    pub keyshare: String,
}

/// Output record of a ceremony
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    /// Display name
    pub name: String,
    /// This device's participant id
    pub local_party_id: PartyId,
    /// Committee that holds the key
    pub signers: Vec<PartyId>,
    /// ECDSA public key (hex), empty until generated
    pub pub_key_ecdsa: String,
    /// EdDSA public key (hex), empty until generated
    pub pub_key_eddsa: String,
    /// BIP32 chain code (hex)
    pub hex_chain_code: String,
    /// Prefix identifying the latest reshare generation
    pub reshare_prefix: Option<String>,
    /// Key shares held by this device
    pub keyshares: Vec<KeyShare>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Vault {
    /// Create an empty vault with a fresh chain code
    pub fn new(name: impl Into<String>, local_party_id: impl Into<PartyId>) -> Self {
        Self {
            name: name.into(),
            local_party_id: local_party_id.into(),
            signers: Vec::new(),
            pub_key_ecdsa: String::new(),
            pub_key_eddsa: String::new(),
            hex_chain_code: generate_chain_code(),
            reshare_prefix: None,
            keyshares: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the chain code (shared by every committee member)
    pub fn with_chain_code(mut self, hex_chain_code: impl Into<String>) -> Self {
        self.hex_chain_code = hex_chain_code.into();
        self
    }

    /// Public key for a key type
    pub fn pub_key(&self, key_type: KeyType) -> &str {
        match key_type {
            KeyType::Ecdsa => &self.pub_key_ecdsa,
            KeyType::Eddsa => &self.pub_key_eddsa,
        }
    }

    /// Record a key share, replacing any earlier share for the same key
    pub fn add_keyshare(&mut self, share: KeyShare) {
        self.keyshares.retain(|s| s.pub_key != share.pub_key);
        self.keyshares.push(share);
    }
}

/// 32 random bytes as lowercase hex
pub fn generate_chain_code() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
