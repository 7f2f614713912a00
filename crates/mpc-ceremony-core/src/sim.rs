//! Simulated threshold engine
//!
//! Stand-in for the external engine when running ceremonies locally. Each
//! phase is a single broadcast round: every party sends a random
//! contribution to the rest of the committee, waits for one contribution
//! from every peer and derives the public key from all of them, so all
//! parties agree on the result only if every message was relayed exactly to
//! the right phase.

use crate::engine::{
    KeygenRequest, KeygenResponse, Messenger, ReshareRequest, ReshareResponse, TssEngine,
    split_parties,
};
use crate::{Error, KeyType, PartyId, Result, TssType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Contribution {
    phase: String,
    from: PartyId,
    value: String,
    #[serde(default)]
    pub_key: String,
}

/// In-process engine that exercises the relay the way a real engine would
pub struct SimulatedEngine {
    inbound_tx: mpsc::UnboundedSender<Contribution>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Contribution>>,
    timeout: Duration,
    fail_on: Option<KeyType>,
}

impl SimulatedEngine {
    /// Create an engine with a 60 second phase timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(60))
    }

    /// Create an engine with a custom phase timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            timeout,
            fail_on: None,
        }
    }

    /// Make every phase for `key_type` fail
    pub fn failing_on(mut self, key_type: KeyType) -> Self {
        self.fail_on = Some(key_type);
        self
    }

    async fn run_phase(
        &self,
        tss_type: TssType,
        key_type: KeyType,
        local: &str,
        parties: &[PartyId],
        pub_key: &str,
        messenger: &dyn Messenger,
    ) -> Result<BTreeMap<PartyId, Contribution>> {
        if self.fail_on == Some(key_type) {
            return Err(Error::Engine(format!("{} engine unavailable", key_type)));
        }

        let phase = format!("{}-{}", tss_type.label(), key_type.label());
        let own = Contribution {
            phase: phase.clone(),
            from: local.to_string(),
            value: hex::encode(rand::random::<[u8; 32]>()),
            pub_key: pub_key.to_string(),
        };

        let peers: Vec<PartyId> = parties.iter().filter(|p| *p != local).cloned().collect();
        if !peers.is_empty() {
            messenger
                .send(local, &peers, &serde_json::to_vec(&own)?)
                .await?;
        }

        let mut received = BTreeMap::new();
        received.insert(local.to_string(), own);

        let mut inbound = self.inbound_rx.lock().await;
        let collect = async {
            while received.len() < parties.len() {
                let msg = inbound
                    .recv()
                    .await
                    .ok_or_else(|| Error::Engine("inbound channel closed".to_string()))?;

                if msg.phase != phase {
                    return Err(Error::Engine(format!(
                        "received {} message from {} during {}",
                        msg.phase, msg.from, phase
                    )));
                }
                if !peers.contains(&msg.from) {
                    return Err(Error::Engine(format!(
                        "message from {} who is not in the committee",
                        msg.from
                    )));
                }

                debug!(phase = %phase, from = %msg.from, "Received contribution");
                received.insert(msg.from.clone(), msg);
            }
            Ok(())
        };

        tokio::time::timeout(self.timeout, collect)
            .await
            .map_err(|_| Error::Timeout(format!("{} contributions", phase)))??;

        Ok(received)
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn digest(label: &str, contributions: &BTreeMap<PartyId, Contribution>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    for (party, contribution) in contributions {
        hasher.update(party.as_bytes());
        hasher.update(contribution.value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn keyshare(local: &str, pub_key: &str, contributions: &BTreeMap<PartyId, Contribution>) -> String {
    let own = contributions.get(local).map(|c| c.value.as_str()).unwrap_or_default();
    hex::encode(Sha256::digest(format!("{}:{}:{}", local, pub_key, own).as_bytes()))
}

#[async_trait]
impl TssEngine for SimulatedEngine {
    fn apply_data(&self, payload: &[u8]) -> Result<()> {
        let contribution: Contribution = serde_json::from_slice(payload)?;
        self.inbound_tx
            .send(contribution)
            .map_err(|_| Error::Engine("engine stopped".to_string()))
    }

    async fn keygen(
        &self,
        key_type: KeyType,
        request: &KeygenRequest,
        messenger: &dyn Messenger,
    ) -> Result<KeygenResponse> {
        let parties = split_parties(&request.all_parties);
        let contributions = self
            .run_phase(
                TssType::Keygen,
                key_type,
                &request.local_party_id,
                &parties,
                "",
                messenger,
            )
            .await?;

        let pub_key = digest(key_type.label(), &contributions);
        Ok(KeygenResponse {
            keyshare: keyshare(&request.local_party_id, &pub_key, &contributions),
            pub_key,
        })
    }

    async fn reshare(
        &self,
        key_type: KeyType,
        request: &ReshareRequest,
        messenger: &dyn Messenger,
    ) -> Result<ReshareResponse> {
        let mut parties = split_parties(&request.old_parties);
        for party in split_parties(&request.new_parties) {
            if !parties.contains(&party) {
                parties.push(party);
            }
        }

        let contributions = self
            .run_phase(
                TssType::Reshare,
                key_type,
                &request.local_party_id,
                &parties,
                &request.pub_key,
                messenger,
            )
            .await?;

        // New members learn the key from members that already hold it
        let pub_key = contributions
            .values()
            .map(|c| c.pub_key.as_str())
            .find(|k| !k.is_empty())
            .ok_or_else(|| Error::Engine(format!("no party holds a {} key", key_type)))?
            .to_string();

        let reshare_prefix = if request.new_reshare_prefix.is_empty() {
            digest("reshare", &contributions)[..16].to_string()
        } else {
            request.new_reshare_prefix.clone()
        };

        Ok(ReshareResponse {
            keyshare: keyshare(&request.local_party_id, &pub_key, &contributions),
            pub_key,
            reshare_prefix,
        })
    }
}
