//! # Relay Flows
//!
//! Runs the notification relay through `Gateway::spawn_relay` against the
//! in-memory backend and reads the newline-delimited output back.
//!
//! ## Covered
//!
//! 1. A channel filter keeps only its own conversation
//! 2. No filter relays every conversation
//! 3. A failed heartbeat terminates the relay and nothing is written afterwards
//! 4. Shutdown through the handle ends the relay cleanly

#[cfg(test)]
mod tests {
    use super::super::init_tracing;
    use kb_api_gateway::{
        ChatChannel, Gateway, GatewayConfig, InMemoryBackend, RelayConfig, RelayError, RelayExit,
        RelayHandle, RelayState, Session,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};
    use tokio::time::timeout;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn gateway() -> (Arc<InMemoryBackend>, Gateway) {
        init_tracing();
        let config = GatewayConfig {
            relay: RelayConfig {
                heartbeat_interval: Duration::from_millis(25),
                probe_timeout: Duration::from_millis(25),
                ..Default::default()
            },
            ..Default::default()
        };
        let backend = Arc::new(InMemoryBackend::new("alice"));
        let session = Arc::new(Session::new(Arc::clone(&backend)));
        (backend, Gateway::new(config, session).expect("valid config"))
    }

    fn direct(name: &str) -> ChatChannel {
        ChatChannel {
            name: name.into(),
            ..Default::default()
        }
    }

    fn start(gw: &Gateway, channels: Vec<ChatChannel>) -> (RelayHandle, Lines<BufReader<DuplexStream>>) {
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let handle = gw.spawn_relay(channels, writer);
        (handle, BufReader::new(reader).lines())
    }

    async fn reach(handle: &RelayHandle, wanted: RelayState) {
        let mut states = handle.watch_state();
        timeout(Duration::from_secs(2), states.wait_for(|s| *s == wanted))
            .await
            .expect("relay state reached in time")
            .expect("relay state channel open");
    }

    async fn next(lines: &mut Lines<BufReader<DuplexStream>>) -> Option<Value> {
        match timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => Some(serde_json::from_str(&line).expect("notification is JSON")),
            _ => None,
        }
    }

    // =============================================================================
    // FILTERING
    // =============================================================================

    #[tokio::test]
    async fn test_filter_keeps_only_subscribed_conversation() {
        let (backend, gw) = gateway();
        let c1 = backend.add_conversation(direct("alice,bob"));
        let c2 = backend.add_conversation(direct("alice,carol"));

        let (handle, mut lines) = start(&gw, vec![direct("alice,bob")]);
        reach(&handle, RelayState::Streaming).await;

        backend.receive_text(&c2, "carol", "not for you");
        assert_eq!(next(&mut lines).await, None);

        backend.receive_text(&c1, "bob", "for you");
        let note = next(&mut lines).await.expect("one notification");
        assert_eq!(note["type"], "chat");
        assert_eq!(note["msg"]["conversation_id"], c1.as_str());
        assert_eq!(next(&mut lines).await, None);

        handle.shutdown();
        assert_eq!(handle.join().await.unwrap(), RelayExit::Cancelled);
    }

    #[tokio::test]
    async fn test_no_filter_relays_everything() {
        let (backend, gw) = gateway();
        let convs = [
            backend.add_conversation(direct("alice,bob")),
            backend.add_conversation(direct("alice,carol")),
            backend.add_conversation(direct("alice,dave")),
        ];

        let (handle, mut lines) = start(&gw, Vec::new());
        reach(&handle, RelayState::Streaming).await;

        for conv in &convs {
            backend.receive_text(conv, "someone", "ping");
        }
        for conv in &convs {
            let note = next(&mut lines).await.expect("notification per conversation");
            assert_eq!(note["msg"]["conversation_id"], conv.as_str());
        }

        handle.shutdown();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_own_activity_hidden_by_default() {
        let (_backend, gw) = gateway();
        let (handle, mut lines) = start(&gw, Vec::new());
        reach(&handle, RelayState::Streaming).await;

        let mut out = Vec::new();
        let send = br#"{"method": "send", "params": {"options": {"channel": {"name": "alice,bob"}, "message": {"body": "mine"}}}}"#;
        gw.send_chat_api(send, &mut out).await.unwrap();
        assert_eq!(next(&mut lines).await, None);

        handle.shutdown();
        handle.join().await.unwrap();
    }

    // =============================================================================
    // LIVENESS
    // =============================================================================

    #[tokio::test]
    async fn test_heartbeat_failure_terminates_relay() {
        let (backend, gw) = gateway();
        let conv = backend.add_conversation(direct("alice,bob"));
        let (handle, mut lines) = start(&gw, Vec::new());
        reach(&handle, RelayState::Streaming).await;

        backend.set_healthy(false);
        reach(&handle, RelayState::Terminated).await;
        assert_eq!(handle.state(), RelayState::Terminated);

        backend.receive_text(&conv, "bob", "lost");
        assert_eq!(next(&mut lines).await, None);

        match handle.join().await {
            Err(RelayError::ConnectionLost(reason)) => {
                assert!(reason.starts_with("connection to service lost: error during ping"));
            }
            other => panic!("expected connection loss, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_writes() {
        let (backend, gw) = gateway();
        let conv = backend.add_conversation(direct("alice,bob"));
        let (handle, mut lines) = start(&gw, Vec::new());
        reach(&handle, RelayState::Streaming).await;

        handle.shutdown();
        reach(&handle, RelayState::Terminated).await;
        backend.receive_text(&conv, "bob", "after shutdown");
        assert_eq!(next(&mut lines).await, None);
        assert_eq!(handle.join().await.unwrap(), RelayExit::Cancelled);
    }
}
