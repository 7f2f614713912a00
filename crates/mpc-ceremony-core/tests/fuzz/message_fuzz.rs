//! Fuzz tests for message construction and committee handling
//!
//! Property-based testing using proptest.

use mpc_ceremony_core::engine::split_parties;
use mpc_ceremony_core::keygen::phase_round_tag;
use mpc_ceremony_core::{KeyType, Message, PhaseTagging, TssType, body_hash};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Party ids without commas or surrounding whitespace
fn party_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9_.:-]{1,16}").unwrap()
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn fuzz_message_body_decodes_to_payload(payload in payload_strategy()) {
        let message = Message::new("s1", "A", vec!["B".into()], &payload);

        prop_assert!(message.hash_matches());
        prop_assert_eq!(message.decode_body().unwrap(), payload);
    }

    #[test]
    fn fuzz_distinct_payloads_have_distinct_hashes(
        a in payload_strategy(),
        b in payload_strategy(),
    ) {
        prop_assume!(a != b);
        let first = Message::new("s1", "A", vec!["B".into()], &a);
        let second = Message::new("s1", "A", vec!["B".into()], &b);

        prop_assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn fuzz_committee_survives_join_and_split(
        committee in prop::collection::vec(party_strategy(), 1..10),
    ) {
        prop_assert_eq!(split_parties(&committee.join(",")), committee);
    }

    #[test]
    fn fuzz_body_hash_is_hex_sha256(body in ".*") {
        let hash = body_hash(&body);

        prop_assert_eq!(hash.len(), 64);
        prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn test_phase_tags_are_unique() {
    let mut tags = HashSet::new();
    for tss_type in [TssType::Keygen, TssType::Reshare] {
        for key_type in [KeyType::Ecdsa, KeyType::Eddsa] {
            let tag = phase_round_tag(PhaseTagging::PerPhase, tss_type, key_type).unwrap();
            assert!(tags.insert(tag));
        }
    }
    assert_eq!(tags.len(), 4);
}
