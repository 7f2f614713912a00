//! # MPC Ceremony Core
//!
//! Client side of relayed multi-party key ceremonies.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Relay trait**: the eight store-and-forward operations every relay backend implements
//! - **Message pump**: background polling that feeds relayed messages to the engine and acknowledges them
//! - **Phase orchestrator**: runs ECDSA then EdDSA key generation or re-sharing over one session
//! - **Simulated engine**: an in-process stand-in for the threshold engine
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mpc_ceremony_core::{Ceremony, CeremonyConfig, Vault, generate_chain_code};
//! use mpc_ceremony_core::sim::SimulatedEngine;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(SimulatedEngine::new());
//! let vault = Vault::new("main", "A").with_chain_code(generate_chain_code());
//!
//! let ceremony = Ceremony::keygen(relay, engine, "session-1", committee)
//!     .with_config(CeremonyConfig::default());
//! let result = ceremony.run(vault).await?;
//! println!("ECDSA key: {}", result.vault.pub_key_ecdsa);
//! ```

pub mod engine;
pub mod error;
pub mod keygen;
pub mod mpc;
pub mod sim;
pub mod types;

pub use engine::{KeygenRequest, KeygenResponse, Messenger, ReshareRequest, ReshareResponse, TssEngine};
pub use error::{Error, Result};
pub use keygen::{Ceremony, CeremonyConfig, CeremonyResult, KeygenStatus, PhaseTagging};
pub use mpc::{MemoryRelay, MessagePump, PumpConfig, Relay, RelayExt, RelayMessenger};
pub use types::{
    KeyShare, KeyType, Message, PartyId, RoundTag, SessionId, TssType, Vault, body_hash,
    generate_chain_code,
};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
