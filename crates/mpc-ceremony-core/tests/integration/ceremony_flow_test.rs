//! End-to-end ceremonies between several parties
//!
//! Every party runs its own orchestrator and simulated engine; they only
//! meet through one shared relay.

use mpc_ceremony_core::sim::SimulatedEngine;
use mpc_ceremony_core::{
    Ceremony, CeremonyConfig, CeremonyResult, KeygenStatus, MemoryRelay, PhaseTagging, Relay,
    RelayExt, Result, Vault,
};
use std::sync::Arc;
use std::time::Duration;

fn parties(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|p| p.to_string()).collect()
}

fn config() -> CeremonyConfig {
    CeremonyConfig::default()
        .with_barrier_delay(Duration::from_millis(100))
        .with_poll_interval(Duration::from_millis(10))
}

/// Run one ceremony per vault, optionally delaying some parties
async fn run_all(
    relay: &Arc<MemoryRelay>,
    session_id: &str,
    committee: Vec<String>,
    old_committee: Vec<String>,
    vaults: Vec<(Vault, Duration)>,
    config: CeremonyConfig,
) -> Vec<Result<CeremonyResult>> {
    let handles: Vec<_> = vaults
        .into_iter()
        .map(|(vault, delay)| {
            let relay = Arc::clone(relay);
            let session_id = session_id.to_string();
            let committee = committee.clone();
            let old_committee = old_committee.clone();
            let config = config.clone();

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                relay
                    .wait_for_start(&session_id, Duration::from_millis(10), Duration::from_secs(5))
                    .await?;

                let engine = Arc::new(SimulatedEngine::with_timeout(Duration::from_secs(10)));
                let ceremony = if old_committee.is_empty() {
                    Ceremony::keygen(relay, engine, session_id, committee)
                } else {
                    Ceremony::reshare(relay, engine, session_id, committee, old_committee)
                }
                .with_config(config);

                let result = ceremony.run(vault).await;
                assert!(ceremony.status().is_terminal());
                result
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

async fn keygen(relay: &Arc<MemoryRelay>, config: CeremonyConfig) -> Vec<CeremonyResult> {
    let committee = parties(&["A", "B", "C"]);
    for party in &committee {
        relay
            .join_session("keygen", std::slice::from_ref(party))
            .await
            .unwrap();
    }
    relay.start_session("keygen", &committee).await.unwrap();

    let vaults = committee
        .iter()
        .map(|p| {
            (
                Vault::new("Main", p.as_str()).with_chain_code("cc"),
                Duration::ZERO,
            )
        })
        .collect();

    run_all(relay, "keygen", committee, Vec::new(), vaults, config)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect()
}

fn assert_same_keys(results: &[CeremonyResult]) {
    let first = &results[0].vault;
    assert_eq!(first.pub_key_ecdsa.len(), 64);
    assert_eq!(first.pub_key_eddsa.len(), 64);
    assert_ne!(first.pub_key_ecdsa, first.pub_key_eddsa);
    for result in results {
        assert_eq!(result.vault.pub_key_ecdsa, first.pub_key_ecdsa);
        assert_eq!(result.vault.pub_key_eddsa, first.pub_key_eddsa);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_party_keygen() {
    let relay = Arc::new(MemoryRelay::new());
    let results = keygen(&relay, config()).await;

    assert_same_keys(&results);
    for result in &results {
        assert!(result.is_new_vault);
        assert_eq!(result.vault.keyshares.len(), 2);
    }

    // Every message was consumed and acknowledged
    assert_eq!(relay.message_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_keygen_untagged_with_barrier() {
    let relay = Arc::new(MemoryRelay::new());
    let results = keygen(
        &relay,
        config().with_phase_tagging(PhaseTagging::Untagged),
    )
    .await;

    assert_same_keys(&results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_skewed_party_never_reads_next_phase() {
    let relay = Arc::new(MemoryRelay::new());
    let committee = parties(&["A", "B", "C"]);
    relay.join_session("skew", &committee).await.unwrap();
    relay.start_session("skew", &committee).await.unwrap();

    // C starts late, so A and B post EdDSA traffic while C is still in ECDSA
    let vaults = vec![
        (Vault::new("Main", "A"), Duration::ZERO),
        (Vault::new("Main", "B"), Duration::ZERO),
        (Vault::new("Main", "C"), Duration::from_millis(300)),
    ];
    let results = run_all(
        &relay,
        "skew",
        committee,
        Vec::new(),
        vaults,
        config().with_barrier_delay(Duration::from_millis(20)),
    )
    .await;

    let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_same_keys(&results);

    // Each phase only ever polled its own tag
    for call in relay.calls().iter().filter(|c| c.op == "get_messages") {
        let tag = call.round_tag.as_deref();
        assert!(matches!(tag, Some("keygen-ecdsa") | Some("keygen-eddsa")));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reshare_to_new_committee() {
    let relay = Arc::new(MemoryRelay::new());
    let keygen_results = keygen(&relay, config()).await;
    let pub_key_ecdsa = keygen_results[0].vault.pub_key_ecdsa.clone();
    let pub_key_eddsa = keygen_results[0].vault.pub_key_eddsa.clone();

    let old = parties(&["A", "B", "C"]);
    let new = parties(&["A", "B", "D"]);
    let mut everyone = old.clone();
    everyone.push("D".to_string());
    relay.join_session("reshare", &everyone).await.unwrap();
    relay.start_session("reshare", &everyone).await.unwrap();

    let mut vaults: Vec<(Vault, Duration)> = keygen_results
        .into_iter()
        .map(|r| (r.vault, Duration::ZERO))
        .collect();
    vaults.push((Vault::new("Main", "D").with_chain_code("cc"), Duration::ZERO));

    let results: Vec<_> = run_all(&relay, "reshare", new.clone(), old, vaults, config())
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let prefix = results[0].vault.reshare_prefix.clone();
    assert!(prefix.is_some());
    for result in &results {
        assert_eq!(result.vault.pub_key_ecdsa, pub_key_ecdsa);
        assert_eq!(result.vault.pub_key_eddsa, pub_key_eddsa);
        assert_eq!(result.vault.reshare_prefix, prefix);
        assert_eq!(result.vault.signers, new);
        assert_eq!(result.is_new_vault, result.vault.local_party_id == "D");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_party_fails_every_ceremony() {
    let relay = Arc::new(MemoryRelay::new());
    let committee = parties(&["A", "B", "C"]);
    relay.start_session("partial", &committee).await.unwrap();

    // C never shows up
    let vaults = vec![
        (Vault::new("Main", "A"), Duration::ZERO),
        (Vault::new("Main", "B"), Duration::ZERO),
    ];
    let engine_timeout_config = config();
    let handles = run_all(
        &relay,
        "partial",
        committee,
        Vec::new(),
        vaults,
        engine_timeout_config,
    );
    let results = tokio::time::timeout(Duration::from_secs(20), handles)
        .await
        .unwrap();

    for result in results {
        assert!(result.is_err());
    }
}

#[tokio::test]
async fn test_status_ends_finished() {
    let relay = Arc::new(MemoryRelay::new());
    let engine = Arc::new(SimulatedEngine::new());
    let ceremony = Ceremony::keygen(relay, engine, "solo", parties(&["A"])).with_config(config());

    let result = ceremony.run(Vault::new("Main", "A")).await.unwrap();
    assert_eq!(ceremony.status(), KeygenStatus::KeygenFinished);
    assert_eq!(result.vault.signers, parties(&["A"]));
}
