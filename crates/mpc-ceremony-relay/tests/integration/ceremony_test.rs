//! Complete ceremonies with every party talking to a real relay over HTTP

use super::TestRelay;
use mpc_ceremony_core::sim::SimulatedEngine;
use mpc_ceremony_core::{
    Ceremony, CeremonyConfig, CeremonyResult, Relay, RelayExt, Result, Vault,
};
use mpc_ceremony_relay::{RelayClient, RelayConfig};
use std::sync::Arc;
use std::time::Duration;

fn parties(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|p| p.to_string()).collect()
}

fn config() -> CeremonyConfig {
    CeremonyConfig::default()
        .with_barrier_delay(Duration::from_millis(100))
        .with_poll_interval(Duration::from_millis(20))
}

/// Run one ceremony per vault, each party with its own client and engine
async fn run_parties(
    relay: &TestRelay,
    session_id: &str,
    committee: Vec<String>,
    old_committee: Vec<String>,
    vaults: Vec<Vault>,
) -> Vec<Result<CeremonyResult>> {
    let handles: Vec<_> = vaults
        .into_iter()
        .map(|vault| {
            let client = Arc::new(relay.client());
            let session_id = session_id.to_string();
            let committee = committee.clone();
            let old_committee = old_committee.clone();

            tokio::spawn(async move {
                client
                    .wait_for_start(&session_id, Duration::from_millis(20), Duration::from_secs(5))
                    .await?;

                let engine = Arc::new(SimulatedEngine::with_timeout(Duration::from_secs(10)));
                let ceremony = if old_committee.is_empty() {
                    Ceremony::keygen(client, engine, session_id, committee)
                } else {
                    Ceremony::reshare(client, engine, session_id, committee, old_committee)
                }
                .with_config(config());

                ceremony.run(vault).await
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

/// Join every party and publish the start signal
async fn open_session(client: &RelayClient, session_id: &str, everyone: &[String]) {
    for party in everyone {
        Relay::join_session(client, session_id, std::slice::from_ref(party))
            .await
            .unwrap();
    }
    client
        .wait_for_participants(
            session_id,
            everyone,
            Duration::from_millis(20),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    Relay::start_session(client, session_id, everyone).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_keygen_then_reshare_over_http() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let coordinator = relay.client();

    // Keygen
    let committee = parties(&["A", "B", "C"]);
    open_session(&coordinator, "keygen", &committee).await;

    let vaults = committee
        .iter()
        .map(|p| Vault::new("Main", p.as_str()).with_chain_code("cc"))
        .collect();
    let keygen: Vec<_> = run_parties(&relay, "keygen", committee.clone(), Vec::new(), vaults)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let pub_key_ecdsa = keygen[0].vault.pub_key_ecdsa.clone();
    let pub_key_eddsa = keygen[0].vault.pub_key_eddsa.clone();
    assert_eq!(pub_key_ecdsa.len(), 64);
    for result in &keygen {
        assert_eq!(result.vault.pub_key_ecdsa, pub_key_ecdsa);
        assert_eq!(result.vault.pub_key_eddsa, pub_key_eddsa);
    }

    coordinator.delete_session("keygen").await.unwrap();

    // Reshare C out and D in
    let new_committee = parties(&["A", "B", "D"]);
    let everyone = parties(&["A", "B", "C", "D"]);
    open_session(&coordinator, "reshare", &everyone).await;

    let mut vaults: Vec<Vault> = keygen.into_iter().map(|r| r.vault).collect();
    vaults.push(Vault::new("Main", "D").with_chain_code("cc"));

    let reshare: Vec<_> = run_parties(&relay, "reshare", new_committee.clone(), committee, vaults)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    for result in &reshare {
        assert_eq!(result.vault.pub_key_ecdsa, pub_key_ecdsa);
        assert_eq!(result.vault.pub_key_eddsa, pub_key_eddsa);
        assert_eq!(result.vault.signers, new_committee);
        assert!(result.vault.reshare_prefix.is_some());
    }

    let stats = relay.service.stats();
    assert!(stats.messages_stored > 0);
    assert!(stats.messages_acknowledged > 0);
    assert_eq!(stats.messages_dropped, 0);
}
