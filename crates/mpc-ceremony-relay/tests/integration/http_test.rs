//! Route semantics exercised through the HTTP client

use super::TestRelay;
use mpc_ceremony_core::{Error, Message, Relay};
use mpc_ceremony_relay::{RelayConfig, RelayError};

fn parties(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|p| p.to_string()).collect()
}

/// A message whose hash is chosen by the test
fn message_with_hash(to: &[&str], body: &str, hash: &str) -> Message {
    Message {
        session_id: String::new(),
        from: "A".into(),
        to: parties(to),
        body: body.into(),
        hash: hash.into(),
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_end_to_end_three_parties() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    for party in ["A", "B", "C"] {
        client.join_session("S1", &parties(&[party])).await.unwrap();
    }
    assert_eq!(
        client.participants("S1").await.unwrap(),
        parties(&["A", "B", "C"])
    );

    client
        .post_message("S1", None, &message_with_hash(&["B", "C"], "aGk=", "h1"))
        .await
        .unwrap();

    let inbox = client.get_messages("S1", "B", None).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].hash, "h1");
    assert_eq!(inbox[0].session_id, "S1");

    client.delete_message("S1", "B", "h1", None).await.unwrap();
    assert!(client.get_messages("S1", "B", None).await.unwrap().is_empty());

    // C's copy is independent
    assert_eq!(client.get_messages("S1", "C", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_join_is_idempotent() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    client.join_session("S1", &parties(&["A", "B"])).await.unwrap();
    client.join_session("S1", &parties(&["A", "B"])).await.unwrap();
    client.join_session("S1", &parties(&["B", "C"])).await.unwrap();

    assert_eq!(
        client.participants("S1").await.unwrap(),
        parties(&["A", "B", "C"])
    );
}

#[tokio::test]
async fn test_ids_with_reserved_characters() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    client
        .join_session("team/42 ?x", &parties(&["party one"]))
        .await
        .unwrap();

    assert_eq!(
        client.participants("team/42 ?x").await.unwrap(),
        parties(&["party one"])
    );
    assert!(matches!(
        client.participants("team").await,
        Err(RelayError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_session_deletion_removes_start_signal() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    client.join_session("S1", &parties(&["A", "B"])).await.unwrap();
    client.start_session("S1", &parties(&["A", "B"])).await.unwrap();
    assert_eq!(
        client.start_committee("S1").await.unwrap(),
        parties(&["A", "B"])
    );

    client.delete_session("S1").await.unwrap();
    client.delete_session("S1").await.unwrap();

    assert!(matches!(
        client.participants("S1").await,
        Err(RelayError::SessionNotFound(_))
    ));
    assert!(matches!(
        client.start_committee("S1").await,
        Err(RelayError::StartNotFound(_))
    ));
}

#[tokio::test]
async fn test_start_signal_is_replaced_whole() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    client.start_session("S1", &parties(&["A", "B", "C"])).await.unwrap();
    client.start_session("S1", &parties(&["A", "C"])).await.unwrap();

    assert_eq!(
        client.start_committee("S1").await.unwrap(),
        parties(&["A", "C"])
    );
}

// ============================================================================
// Messages
// ============================================================================

#[tokio::test]
async fn test_round_tags_isolate_messages() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    client
        .post_message("S1", Some("r1"), &message_with_hash(&["B"], "cjE=", "h1"))
        .await
        .unwrap();
    client
        .post_message("S1", None, &message_with_hash(&["B"], "bm9uZQ==", "h2"))
        .await
        .unwrap();

    let r1 = client.get_messages("S1", "B", Some("r1")).await.unwrap();
    let r2 = client.get_messages("S1", "B", Some("r2")).await.unwrap();
    let untagged = client.get_messages("S1", "B", None).await.unwrap();

    assert_eq!(r1.len(), 1);
    assert_eq!(r1[0].hash, "h1");
    assert!(r2.is_empty());
    assert_eq!(untagged.len(), 1);
    assert_eq!(untagged[0].hash, "h2");

    // Acknowledging under the wrong tag leaves the copy alone
    client.delete_message("S1", "B", "h1", None).await.unwrap();
    assert_eq!(client.get_messages("S1", "B", Some("r1")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_message_is_idempotent() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    client
        .post_message("S1", None, &message_with_hash(&["B"], "eA==", "h1"))
        .await
        .unwrap();

    client.delete_message("S1", "B", "h1", None).await.unwrap();
    client.delete_message("S1", "B", "h1", None).await.unwrap();
    client.delete_message("S1", "B", "never", None).await.unwrap();
}

#[tokio::test]
async fn test_same_key_is_last_write_wins() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    // Two bodies under one hash: the relay keys copies by hash, so the second
    // post replaces the first. Senders derive the hash from the body to avoid
    // this.
    client
        .post_message("S1", None, &message_with_hash(&["B"], "Zmlyc3Q=", "h1"))
        .await
        .unwrap();
    client
        .post_message("S1", None, &message_with_hash(&["B"], "c2Vjb25k", "h1"))
        .await
        .unwrap();

    let inbox = client.get_messages("S1", "B", None).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].body, "c2Vjb25k");
}

#[tokio::test]
async fn test_partial_fan_out_reports_dropped_recipients() {
    let relay = TestRelay::start(RelayConfig::default().with_max_entries(2)).await;
    let client = relay.client();
    let message = Message::new("S1", "A", parties(&["B", "C", "D"]), b"round one");

    let err = client.post_message("S1", None, &message).await.unwrap_err();
    match err {
        RelayError::Dropped { hash, recipients } => {
            assert_eq!(hash, message.hash);
            assert_eq!(recipients, parties(&["D"]));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Copies that fit were kept
    assert_eq!(client.get_messages("S1", "B", None).await.unwrap().len(), 1);
    assert_eq!(client.get_messages("S1", "C", None).await.unwrap().len(), 1);
    assert_eq!(relay.service.stats().messages_dropped, 1);

    // Joining a new session no longer fits either
    assert!(matches!(
        client.join_session("S2", &parties(&["A"])).await,
        Err(RelayError::StoreFull(_))
    ));
}

#[tokio::test]
async fn test_bad_json_is_rejected() {
    let relay = TestRelay::start(RelayConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/message/S1", relay.url))
        .body("{\"from\": 1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

// ============================================================================
// Relay Trait
// ============================================================================

#[tokio::test]
async fn test_trait_errors_map_to_core_errors() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let client = relay.client();

    let err = Relay::start_committee(&client, "S1").await.unwrap_err();
    assert!(matches!(err, Error::StartNotFound(_)));
    assert!(err.is_not_found());

    let err = Relay::participants(&client, "S1").await.unwrap_err();
    assert!(matches!(err, Error::SessionNotFound(_)));
}

#[tokio::test]
async fn test_unreachable_relay_is_transient() {
    // Bind then drop a listener to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = mpc_ceremony_relay::RelayClient::with_url(format!("http://{}", addr)).unwrap();
    let err = Relay::get_messages(&client, "S1", "B", None)
        .await
        .unwrap_err();

    assert!(err.is_transient());
}
