//! Unit tests module
//!
//! - Message pump
//! - Phase orchestrator
