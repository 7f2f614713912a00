//! Interface to the threshold-signature engine
//!
//! The engine is an external collaborator: it consumes inbound protocol
//! messages through `apply_data`, emits outbound ones through a `Messenger`,
//! and returns key material when a phase completes.

use crate::{KeyType, PartyId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outbound half of the engine's transport
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `payload` from `from` to every party in `to`
    async fn send(&self, from: &str, to: &[PartyId], payload: &[u8]) -> Result<()>;
}

/// Threshold-signature engine driven by the orchestrator
#[async_trait]
pub trait TssEngine: Send + Sync {
    /// Enqueue one inbound protocol message
    ///
    /// Must not block on protocol computation. An error means the payload
    /// was not accepted and will be offered again.
    fn apply_data(&self, payload: &[u8]) -> Result<()>;

    /// Run distributed key generation for one key type
    async fn keygen(
        &self,
        key_type: KeyType,
        request: &KeygenRequest,
        messenger: &dyn Messenger,
    ) -> Result<KeygenResponse>;

    /// Re-share an existing key for one key type
    async fn reshare(
        &self,
        key_type: KeyType,
        request: &ReshareRequest,
        messenger: &dyn Messenger,
    ) -> Result<ReshareResponse>;
}

/// Parameters of a key-generation phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenRequest {
    /// This device's participant id
    pub local_party_id: PartyId,
    /// Comma-separated committee
    pub all_parties: String,
    /// BIP32 chain code (hex)
    pub chain_code_hex: String,
}

/// Parameters of a re-sharing phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshareRequest {
    /// This device's participant id
    pub local_party_id: PartyId,
    /// Public key being re-shared
    pub pub_key: String,
    /// Comma-separated committee holding the key today
    pub old_parties: String,
    /// Comma-separated committee receiving the key
    pub new_parties: String,
    /// Prefix of the current share generation (empty if never reshared)
    pub reshare_prefix: String,
    /// Prefix chosen by an earlier phase of the same ceremony
    pub new_reshare_prefix: String,
    /// BIP32 chain code (hex)
    pub chain_code_hex: String,
}

/// Result of a key-generation phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenResponse {
    /// Generated public key (hex)
    pub pub_key: String,
    /// Opaque share data for this device
    pub keyshare: String,
}

/// Result of a re-sharing phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshareResponse {
    /// Public key after re-sharing (hex)
    pub pub_key: String,
    /// Prefix identifying the new share generation
    pub reshare_prefix: String,
    /// Opaque share data for this device
    pub keyshare: String,
}

/// Split a comma-separated committee
pub fn split_parties(parties: &str) -> Vec<PartyId> {
    parties
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
