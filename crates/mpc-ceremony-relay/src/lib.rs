//! # MPC Ceremony Relay
//!
//! Store-and-forward relay that lets devices without a direct link run a
//! multi-round key ceremony through a shared intermediary.
//!
//! ## Features
//!
//! - **Sessions**: participant sets that only grow until the session is deleted
//! - **Start gate**: the committee that actually begins a ceremony
//! - **Messages**: one stored copy per recipient, scoped by an optional round tag
//! - **HTTP server** (`server` feature) and **HTTP client** (`client` feature)
//!
//! ## Message Flow
//!
//! ```text
//! Party A ──post──► Relay ◄──poll── Party B
//!                    │                 │
//!                    │ ◄────ack────────┘
//!                    │
//!                    └──── copy for C stays until C acknowledges it
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mpc_ceremony_relay::{RelayConfig, RelayServer};
//!
//! let config = RelayConfig::default()
//!     .with_listen_addr(([0, 0, 0, 0], 8080))
//!     .with_max_entries(50_000);
//!
//! // Serve until SIGINT/SIGTERM, then wipe the store
//! RelayServer::new(config).serve().await?;
//! ```

pub mod error;
pub mod service;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub mod client;

pub use error::{RelayError, Result};
pub use service::{PostReceipt, RelayService, RelayStats};
pub use store::{Entry, EntryKey, JoinOutcome, RelayStore, SessionRecord, Slot, StartSignal};

#[cfg(feature = "server")]
pub use server::{ApiError, RelayConfig, RelayServer};

#[cfg(feature = "client")]
pub use client::{RelayClient, RelayClientConfig};

/// Header carrying the round tag of a message route
pub const ROUND_TAG_HEADER: &str = "message_id";
