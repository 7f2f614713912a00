//! Phase orchestrator for one ceremony

use super::{CeremonyConfig, CeremonyResult, KeygenStatus, PhaseTagging, phase_round_tag};
use crate::engine::{KeygenRequest, ReshareRequest, TssEngine};
use crate::mpc::{MessagePump, Relay, RelayMessenger};
use crate::{Error, KeyShare, KeyType, PartyId, Result, SessionId, TssType, Vault};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

/// Drives one key-generation or re-sharing ceremony
///
/// The ceremony owns no state on the relay: participants must already have
/// joined and started the session. `run` starts the message pump, runs the
/// ECDSA phase, waits out the barrier, runs the EdDSA phase and always stops
/// the pump before returning. A failure in any phase is final.
pub struct Ceremony<R: Relay + ?Sized, E: TssEngine + ?Sized> {
    relay: Arc<R>,
    engine: Arc<E>,
    session_id: SessionId,
    tss_type: TssType,
    committee: Vec<PartyId>,
    old_committee: Vec<PartyId>,
    config: CeremonyConfig,
    status: watch::Sender<KeygenStatus>,
}

impl<R, E> Ceremony<R, E>
where
    R: Relay + ?Sized + 'static,
    E: TssEngine + ?Sized + 'static,
{
    /// Prepare a key-generation ceremony for `committee`
    pub fn keygen(
        relay: Arc<R>,
        engine: Arc<E>,
        session_id: impl Into<SessionId>,
        committee: Vec<PartyId>,
    ) -> Self {
        Self::new(relay, engine, session_id.into(), TssType::Keygen, committee, Vec::new())
    }

    /// Prepare a re-sharing ceremony from `old_committee` to `committee`
    pub fn reshare(
        relay: Arc<R>,
        engine: Arc<E>,
        session_id: impl Into<SessionId>,
        committee: Vec<PartyId>,
        old_committee: Vec<PartyId>,
    ) -> Self {
        Self::new(
            relay,
            engine,
            session_id.into(),
            TssType::Reshare,
            committee,
            old_committee,
        )
    }

    fn new(
        relay: Arc<R>,
        engine: Arc<E>,
        session_id: SessionId,
        tss_type: TssType,
        committee: Vec<PartyId>,
        old_committee: Vec<PartyId>,
    ) -> Self {
        let (status, _) = watch::channel(KeygenStatus::CreatingInstance);
        Self {
            relay,
            engine,
            session_id,
            tss_type,
            committee,
            old_committee,
            config: CeremonyConfig::default(),
            status,
        }
    }

    /// Replace the default configuration
    pub fn with_config(mut self, config: CeremonyConfig) -> Self {
        self.config = config;
        self
    }

    /// Current status
    pub fn status(&self) -> KeygenStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<KeygenStatus> {
        self.status.subscribe()
    }

    /// Kind of ceremony
    pub fn tss_type(&self) -> TssType {
        self.tss_type
    }

    /// Round tag used for a phase
    pub fn round_tag(&self, key_type: KeyType) -> Option<String> {
        phase_round_tag(self.config.phase_tagging, self.tss_type, key_type)
    }

    /// Run both phases and return the updated vault
    #[instrument(skip_all, fields(session_id = %self.session_id, tss_type = %self.tss_type))]
    pub async fn run(&self, mut vault: Vault) -> Result<CeremonyResult> {
        self.set_status(KeygenStatus::CreatingInstance);

        match self.execute(&mut vault).await {
            Ok(()) => {
                self.set_status(KeygenStatus::KeygenFinished);
                info!(
                    pub_key_ecdsa = %vault.pub_key_ecdsa,
                    pub_key_eddsa = %vault.pub_key_eddsa,
                    "Ceremony finished"
                );
                let is_new_vault = match self.tss_type {
                    TssType::Keygen => true,
                    TssType::Reshare => !self.old_committee.contains(&vault.local_party_id),
                };
                Ok(CeremonyResult {
                    vault,
                    is_new_vault,
                })
            }
            Err(e) => {
                error!(error = %e, "Ceremony failed");
                self.set_status(KeygenStatus::KeygenFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute(&self, vault: &mut Vault) -> Result<()> {
        self.validate(vault)?;
        vault.signers = self.committee.clone();

        let mut pump = self.start_pump(&vault.local_party_id, KeyType::Ecdsa);
        let result = match self.tss_type {
            TssType::Keygen => self.run_keygen(vault, &mut pump).await,
            TssType::Reshare => self.run_reshare(vault, &mut pump).await,
        };
        pump.stop().await;

        result
    }

    fn validate(&self, vault: &Vault) -> Result<()> {
        if self.committee.is_empty() {
            return Err(Error::InvalidConfig("committee is empty".to_string()));
        }

        let local = &vault.local_party_id;
        let is_member = self.committee.contains(local)
            || (self.tss_type == TssType::Reshare && self.old_committee.contains(local));
        if !is_member {
            return Err(Error::InvalidConfig(format!(
                "local party {} is not part of the committee",
                local
            )));
        }

        Ok(())
    }

    async fn run_keygen(&self, vault: &mut Vault, pump: &mut MessagePump) -> Result<()> {
        let request = KeygenRequest {
            local_party_id: vault.local_party_id.clone(),
            all_parties: self.committee.join(","),
            chain_code_hex: vault.hex_chain_code.clone(),
        };
        debug!(chain_code = %request.chain_code_hex, "Keygen request prepared");

        self.set_status(KeygenStatus::phase(TssType::Keygen, KeyType::Ecdsa));
        let messenger = self.messenger(KeyType::Ecdsa);
        let ecdsa = self
            .engine
            .keygen(KeyType::Ecdsa, &request, &messenger)
            .await
            .map_err(|e| self.phase_error(KeyType::Ecdsa, e))?;
        vault.pub_key_ecdsa = ecdsa.pub_key.clone();
        vault.add_keyshare(KeyShare {
            pub_key: ecdsa.pub_key,
            keyshare: ecdsa.keyshare,
        });

        self.set_status(KeygenStatus::phase(TssType::Keygen, KeyType::Eddsa));
        self.barrier(&vault.local_party_id, pump).await;

        let messenger = self.messenger(KeyType::Eddsa);
        let eddsa = self
            .engine
            .keygen(KeyType::Eddsa, &request, &messenger)
            .await
            .map_err(|e| self.phase_error(KeyType::Eddsa, e))?;
        vault.pub_key_eddsa = eddsa.pub_key.clone();
        vault.add_keyshare(KeyShare {
            pub_key: eddsa.pub_key,
            keyshare: eddsa.keyshare,
        });

        Ok(())
    }

    async fn run_reshare(&self, vault: &mut Vault, pump: &mut MessagePump) -> Result<()> {
        let mut request = ReshareRequest {
            local_party_id: vault.local_party_id.clone(),
            pub_key: vault.pub_key_ecdsa.clone(),
            old_parties: self.old_committee.join(","),
            new_parties: self.committee.join(","),
            reshare_prefix: vault.reshare_prefix.clone().unwrap_or_default(),
            new_reshare_prefix: String::new(),
            chain_code_hex: vault.hex_chain_code.clone(),
        };
        debug!(chain_code = %request.chain_code_hex, "Reshare request prepared");

        self.set_status(KeygenStatus::phase(TssType::Reshare, KeyType::Ecdsa));
        let messenger = self.messenger(KeyType::Ecdsa);
        let ecdsa = self
            .engine
            .reshare(KeyType::Ecdsa, &request, &messenger)
            .await
            .map_err(|e| self.phase_error(KeyType::Ecdsa, e))?;
        vault.pub_key_ecdsa = ecdsa.pub_key.clone();
        vault.reshare_prefix = Some(ecdsa.reshare_prefix.clone());
        vault.add_keyshare(KeyShare {
            pub_key: ecdsa.pub_key,
            keyshare: ecdsa.keyshare,
        });

        self.set_status(KeygenStatus::phase(TssType::Reshare, KeyType::Eddsa));
        self.barrier(&vault.local_party_id, pump).await;

        // The old prefix still identifies the EdDSA shares being replaced
        request.pub_key = vault.pub_key_eddsa.clone();
        request.new_reshare_prefix = ecdsa.reshare_prefix;
        let messenger = self.messenger(KeyType::Eddsa);
        let eddsa = self
            .engine
            .reshare(KeyType::Eddsa, &request, &messenger)
            .await
            .map_err(|e| self.phase_error(KeyType::Eddsa, e))?;
        vault.pub_key_eddsa = eddsa.pub_key.clone();
        vault.add_keyshare(KeyShare {
            pub_key: eddsa.pub_key,
            keyshare: eddsa.keyshare,
        });

        Ok(())
    }

    /// Wait for peers to catch up, switching the pump to the EdDSA tag
    async fn barrier(&self, local_party_id: &str, pump: &mut MessagePump) {
        let retag = self.config.phase_tagging == PhaseTagging::PerPhase;
        if retag {
            pump.stop().await;
        }

        debug!(delay_ms = self.config.barrier_delay.as_millis() as u64, "Phase barrier");
        tokio::time::sleep(self.config.barrier_delay).await;

        if retag {
            *pump = self.start_pump(local_party_id, KeyType::Eddsa);
        }
    }

    fn start_pump(&self, local_party_id: &str, key_type: KeyType) -> MessagePump {
        MessagePump::start(
            Arc::clone(&self.relay),
            Arc::clone(&self.engine),
            self.session_id.clone(),
            local_party_id,
            self.round_tag(key_type),
            self.config.pump.clone(),
        )
    }

    fn messenger(&self, key_type: KeyType) -> RelayMessenger<R> {
        RelayMessenger::new(
            Arc::clone(&self.relay),
            self.session_id.clone(),
            self.round_tag(key_type),
        )
    }

    fn phase_error(&self, key_type: KeyType, e: Error) -> Error {
        Error::Engine(format!("{} {} phase failed: {}", self.tss_type, key_type, e))
    }

    fn set_status(&self, status: KeygenStatus) {
        info!(status = %status, "Ceremony status");
        self.status.send_replace(status);
    }
}
