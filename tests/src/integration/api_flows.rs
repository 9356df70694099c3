//! # API Flows
//!
//! Drives the three `send_*_api` entry points with raw envelope bytes and
//! checks the newline-delimited replies that come back.
//!
//! ## Covered
//!
//! 1. Reply envelopes echo `id` / `jsonrpc` and carry exactly one of error or result
//! 2. Unknown methods and empty required options are transport errors
//! 3. Rate limits from every backend call are merged into the result
//! 4. Ambiguous channel addresses fail with an address-resolution error
//! 5. Reply errors survive a serialize/parse cycle with code, message and data

#[cfg(test)]
mod tests {
    use super::super::init_tracing;
    use chrono::{TimeZone, Utc};
    use kb_api_gateway::domain::error::codes;
    use kb_api_gateway::domain::rate_limit::aggregate;
    use kb_api_gateway::{
        ChatChannel, Gateway, GatewayConfig, GatewayError, InMemoryBackend, RateLimit, Reply,
        Session, TeamRole,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn gateway() -> (Arc<InMemoryBackend>, Gateway) {
        init_tracing();
        let backend = Arc::new(InMemoryBackend::new("alice"));
        let session = Arc::new(Session::new(Arc::clone(&backend)));
        let gateway = Gateway::new(GatewayConfig::default(), session).expect("default config");
        (backend, gateway)
    }

    fn direct(name: &str) -> ChatChannel {
        ChatChannel {
            name: name.into(),
            ..Default::default()
        }
    }

    fn limit(name: &str, remaining: i64) -> RateLimit {
        RateLimit {
            name: name.into(),
            calls_remaining: remaining,
            window_reset: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            max_calls: 10,
        }
    }

    fn replies(out: &[u8]) -> Vec<Value> {
        out.split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).expect("reply is JSON"))
            .collect()
    }

    // =============================================================================
    // ENVELOPES
    // =============================================================================

    #[tokio::test]
    async fn test_reply_echoes_envelope() {
        let (backend, gw) = gateway();
        backend.add_conversation(direct("alice,bob"));

        let input = br#"{"jsonrpc": "2.0", "id": 42, "method": "list"}"#;
        let mut out = Vec::new();
        gw.send_chat_api(input, &mut out).await.unwrap();

        let replies = replies(&out);
        assert_eq!(replies.len(), 1);
        let reply = &replies[0];
        assert_eq!(reply["jsonrpc"], "2.0");
        assert_eq!(reply["id"], 42);
        assert!(reply.get("result").is_some() != reply.get("error").is_some());
        assert_eq!(reply["result"]["conversations"][0]["channel"]["name"], "alice,bob");
    }

    #[tokio::test]
    async fn test_failed_call_still_echoes_envelope() {
        let (_backend, gw) = gateway();
        let input = br#"{"jsonrpc": "2.0", "id": 7, "method": "read", "params": {"options": {"channel": {"name": "alice,nobody"}}}}"#;
        let mut out = Vec::new();
        gw.send_chat_api(input, &mut out).await.unwrap();

        let reply = &replies(&out)[0];
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["jsonrpc"], "2.0");
        assert!(reply.get("result").is_none());
        assert_eq!(reply["error"]["code"], codes::RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_method_writes_nothing() {
        let (backend, gw) = gateway();
        let mut out = Vec::new();
        let err = gw
            .send_chat_api(br#"{"id": 1, "method": "frobnicate"}"#, &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::UnknownMethod { ref method, version: 1 } if method == "frobnicate"));
        assert!(out.is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_required_options_missing() {
        let (backend, gw) = gateway();
        for method in ["read", "send", "edit", "reaction", "attach", "join", "leave"] {
            let input = format!(r#"{{"id": 1, "method": "{}"}}"#, method);
            let mut out = Vec::new();
            let err = gw.send_chat_api(input.as_bytes(), &mut out).await.unwrap_err();
            assert!(
                matches!(err, GatewayError::InvalidOptions { .. }),
                "{} gave {:?}",
                method,
                err
            );
            assert!(out.is_empty());
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let (_backend, gw) = gateway();
        let mut out = Vec::new();
        let err = gw
            .send_team_api(
                br#"{"method": "list-self-memberships", "params": {"version": 2}}"#,
                &mut out,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedVersion { version: 2, .. }));
    }

    // =============================================================================
    // CHAT ROUND TRIP
    // =============================================================================

    #[tokio::test]
    async fn test_send_then_read() {
        let (_backend, gw) = gateway();
        let input = br#"
            {"id": 1, "method": "send", "params": {"options": {"channel": {"name": "alice,bob"}, "message": {"body": "hi bob"}}}}
            {"id": 2, "method": "read", "params": {"options": {"channel": {"name": "alice,bob"}}}}
        "#;
        let mut out = Vec::new();
        assert_eq!(gw.send_chat_api(input, &mut out).await.unwrap(), 2);

        let replies = replies(&out);
        assert_eq!(replies[0]["result"]["message"], "message sent");
        let messages = &replies[1]["result"]["messages"];
        assert_eq!(messages[0]["msg"]["content"]["text"]["body"], "hi bob");
        assert_eq!(messages[0]["msg"]["sender"]["username"], "alice");
        assert_eq!(messages[0]["msg"]["unread"], false);
    }

    #[tokio::test]
    async fn test_ambiguous_channel_fails_resolution() {
        let (backend, gw) = gateway();
        backend.add_team("acme", &[("alice", TeamRole::Owner)], false);
        for topic in ["general", "random"] {
            backend.add_conversation(ChatChannel {
                name: "acme".into(),
                members_type: "team".into(),
                topic_name: topic.into(),
                ..Default::default()
            });
        }

        let input = br#"{"id": 3, "method": "read", "params": {"options": {"channel": {"name": "acme", "members_type": "team"}}}}"#;
        let mut out = Vec::new();
        gw.send_chat_api(input, &mut out).await.unwrap();

        let reply = &replies(&out)[0];
        assert_eq!(reply["error"]["code"], codes::RESOURCE_NOT_FOUND);
        assert!(reply["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("multiple conversations matched"));
    }

    // =============================================================================
    // RATE LIMITS
    // =============================================================================

    #[test]
    fn test_aggregate_keeps_latest_per_tank() {
        let merged = aggregate(&[limit("a", 1), limit("a", 5), limit("b", 2)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "a");
        assert_eq!(merged[0].calls_remaining, 5);
        assert_eq!(merged[1].calls_remaining, 2);
    }

    #[tokio::test]
    async fn test_rate_limits_attached_to_result() {
        let (backend, gw) = gateway();
        backend.set_rate_limits(vec![limit("a", 1), limit("a", 5), limit("b", 2)]);

        let input = br#"{"id": 1, "method": "send", "params": {"options": {"channel": {"name": "alice,bob"}, "message": {"body": "x"}}}}"#;
        let mut out = Vec::new();
        gw.send_chat_api(input, &mut out).await.unwrap();

        let limits = replies(&out)[0]["result"]["ratelimits"].clone();
        assert_eq!(
            limits,
            json!([
                {"tank": "a", "capacity": 10, "reset": 1_700_000_000, "gas": 5},
                {"tank": "b", "capacity": 10, "reset": 1_700_000_000, "gas": 2},
            ])
        );
    }

    #[tokio::test]
    async fn test_throttled_call_round_trips_error() {
        let (backend, gw) = gateway();
        backend.set_throttle(Some(limit("chat", 0)));

        let mut out = Vec::new();
        gw.send_chat_api(br#"{"id": 9, "method": "list"}"#, &mut out)
            .await
            .unwrap();

        let line = out.split(|b| *b == b'\n').next().unwrap();
        let reply: Reply = serde_json::from_slice(line).unwrap();
        let error = reply.error.clone().expect("error reply");
        assert_eq!(error.code, codes::RATE_LIMITED);
        assert_eq!(error.data.as_ref().unwrap()["tank"], "chat");
        assert_eq!(error.data.as_ref().unwrap()["gas"], 0);

        let again: Reply = serde_json::from_str(&serde_json::to_string(&reply).unwrap()).unwrap();
        assert_eq!(again, reply);
    }

    // =============================================================================
    // TEAM AND KVSTORE
    // =============================================================================

    #[tokio::test]
    async fn test_team_memberships() {
        let (backend, gw) = gateway();
        backend.add_team("acme", &[("alice", TeamRole::Admin), ("bob", TeamRole::Reader)], true);

        let input = br#"{"id": 1, "method": "list-team-memberships", "params": {"options": {"team": "acme"}}}"#;
        let mut out = Vec::new();
        gw.send_team_api(input, &mut out).await.unwrap();

        let result = replies(&out)[0]["result"].clone();
        assert_eq!(result["members"]["admins"][0]["username"], "alice");
        assert_eq!(result["members"]["readers"][0]["username"], "bob");
    }

    #[tokio::test]
    async fn test_kvstore_revisions() {
        let (_backend, gw) = gateway();
        let input = br#"
            {"id": 1, "method": "put", "params": {"options": {"team": "acme", "namespace": "n", "entryKey": "k", "entryValue": "v1"}}}
            {"id": 2, "method": "put", "params": {"options": {"team": "acme", "namespace": "n", "entryKey": "k", "entryValue": "v2", "revision": 1}}}
            {"id": 3, "method": "put", "params": {"options": {"team": "acme", "namespace": "n", "entryKey": "k", "entryValue": "v3", "revision": 2}}}
            {"id": 4, "method": "get", "params": {"options": {"team": "acme", "namespace": "n", "entryKey": "k"}}}
        "#;
        let mut out = Vec::new();
        assert_eq!(gw.send_kvstore_api(input, &mut out).await.unwrap(), 4);

        let replies = replies(&out);
        assert_eq!(replies[0]["result"]["revision"], 1);
        assert_eq!(replies[1]["error"]["code"], codes::SERVER_ERROR);
        assert_eq!(replies[2]["result"]["revision"], 2);
        assert_eq!(replies[3]["result"]["entryValue"], "v3");
    }
}
