//! Key-generation and re-sharing ceremonies
//!
//! A ceremony runs the engine twice over the same relay session: once for
//! ECDSA and once for EdDSA. Between the two phases a fixed delay gives
//! slower peers time to finish the first phase. When phase tagging is on,
//! each phase also gets its own round tag so that first-phase stragglers can
//! never read second-phase traffic.

mod ceremony;

pub use ceremony::Ceremony;

use crate::mpc::PumpConfig;
use crate::{KeyType, TssType, Vault};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Progress of a ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeygenStatus {
    /// Preparing the engine and pump
    CreatingInstance,
    /// Generating the ECDSA key
    KeygenEcdsa,
    /// Generating the EdDSA key
    KeygenEddsa,
    /// Re-sharing the ECDSA key
    ReshareEcdsa,
    /// Re-sharing the EdDSA key
    ReshareEddsa,
    /// Both phases succeeded
    KeygenFinished,
    /// The ceremony failed and must be restarted from scratch
    KeygenFailed { error: String },
}

impl KeygenStatus {
    /// Status of the phase running `key_type` for `tss_type`
    pub fn phase(tss_type: TssType, key_type: KeyType) -> Self {
        match (tss_type, key_type) {
            (TssType::Keygen, KeyType::Ecdsa) => KeygenStatus::KeygenEcdsa,
            (TssType::Keygen, KeyType::Eddsa) => KeygenStatus::KeygenEddsa,
            (TssType::Reshare, KeyType::Ecdsa) => KeygenStatus::ReshareEcdsa,
            (TssType::Reshare, KeyType::Eddsa) => KeygenStatus::ReshareEddsa,
        }
    }

    /// Check if the ceremony has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            KeygenStatus::KeygenFinished | KeygenStatus::KeygenFailed { .. }
        )
    }
}

impl fmt::Display for KeygenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeygenStatus::CreatingInstance => write!(f, "creating instance"),
            KeygenStatus::KeygenEcdsa => write!(f, "generating ECDSA key"),
            KeygenStatus::KeygenEddsa => write!(f, "generating EdDSA key"),
            KeygenStatus::ReshareEcdsa => write!(f, "resharing ECDSA key"),
            KeygenStatus::ReshareEddsa => write!(f, "resharing EdDSA key"),
            KeygenStatus::KeygenFinished => write!(f, "finished"),
            KeygenStatus::KeygenFailed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// How phases are separated on the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTagging {
    /// Both phases share the untagged namespace and one pump
    Untagged,
    /// Each phase polls and posts under its own round tag
    #[default]
    PerPhase,
}

/// Ceremony configuration
#[derive(Debug, Clone)]
pub struct CeremonyConfig {
    /// Delay between the ECDSA and EdDSA phases
    pub barrier_delay: Duration,
    /// Round tag policy
    pub phase_tagging: PhaseTagging,
    /// Message pump settings
    pub pump: PumpConfig,
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        Self {
            barrier_delay: Duration::from_secs(1),
            phase_tagging: PhaseTagging::PerPhase,
            pump: PumpConfig::default(),
        }
    }
}

impl CeremonyConfig {
    /// Set the inter-phase delay
    pub fn with_barrier_delay(mut self, delay: Duration) -> Self {
        self.barrier_delay = delay;
        self
    }

    /// Set the round tag policy
    pub fn with_phase_tagging(mut self, tagging: PhaseTagging) -> Self {
        self.phase_tagging = tagging;
        self
    }

    /// Set the pump poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.pump.poll_interval = interval;
        self
    }
}

/// Round tag of a phase, if phases are tagged
pub fn phase_round_tag(
    tagging: PhaseTagging,
    tss_type: TssType,
    key_type: KeyType,
) -> Option<String> {
    match tagging {
        PhaseTagging::Untagged => None,
        PhaseTagging::PerPhase => Some(format!("{}-{}", tss_type.label(), key_type.label())),
    }
}

/// Result of a successful ceremony
#[derive(Debug, Clone)]
pub struct CeremonyResult {
    /// Vault carrying the new public keys and shares
    pub vault: Vault,
    /// Whether the vault did not exist on this device before the ceremony
    pub is_new_vault: bool,
}
