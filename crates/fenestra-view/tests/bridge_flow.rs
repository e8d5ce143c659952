//! Inbound policy gate, RPC dispatch, and service exposure, end to end.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use parking_lot::Mutex;
use serde_json::{json, Value};

use fenestra_bridge::{DropDiagnostic, DropDiagnosticsSink, DropReason, ServiceMethods, SyncFn};
use fenestra_core::{codes, BridgeConfig, RateLimit, WebViewConfig, WebViewError};
use fenestra_view::{WebView, WebViewEvent};

use common::{inbound, new_view, settle, RecordingTransport, TestAdapter};

#[derive(Default)]
struct RecordingSink {
    drops: Mutex<Vec<DropReason>>,
}

impl DropDiagnosticsSink for RecordingSink {
    fn message_dropped(&self, diagnostic: &DropDiagnostic) {
        self.drops.lock().push(diagnostic.reason);
    }
}

fn config_with_origins(origins: &[&str]) -> WebViewConfig {
    WebViewConfig {
        bridge: BridgeConfig {
            allowed_origins: origins.iter().map(|s| (*s).to_owned()).collect::<HashSet<_>>(),
            ..BridgeConfig::default()
        },
        ..WebViewConfig::default()
    }
}

/// View wired to a recording transport with the bridge already enabled.
async fn bridged_view(
    config: WebViewConfig,
    sink: Option<Arc<RecordingSink>>,
) -> (WebView, Arc<RecordingTransport>) {
    common::init_tracing();
    let (adapter, _started) = TestAdapter::new();
    let transport = RecordingTransport::new();
    let view = WebView::new(adapter, Arc::clone(&transport) as _, config);
    let diagnostics = sink.map(|s| s as Arc<dyn DropDiagnosticsSink>);
    view.enable_bridge(diagnostics).await.unwrap();
    (view, transport)
}

fn echo_service() -> ServiceMethods {
    ServiceMethods::new("Echo").member(
        "say",
        SyncFn::new(|params: Option<Value>| Ok(params.unwrap_or(Value::Null))),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy gate
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unlisted_origin_is_dropped_with_diagnostic() {
    let sink = Arc::new(RecordingSink::default());
    let (view, _transport) =
        bridged_view(config_with_origins(&["https://good.test"]), Some(Arc::clone(&sink))).await;
    let host = view.adapter_host();

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let _ = view
        .subscribe(move |event| recorded.lock().push(event.clone()))
        .await
        .unwrap();

    host.message_received(inbound(&view, "hello", "https://evil.test"));
    settle(&view).await;

    assert_eq!(*sink.drops.lock(), vec![DropReason::OriginNotAllowed]);
    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn allowed_plain_message_reaches_subscribers() {
    let (view, _transport) = bridged_view(config_with_origins(&["https://good.test"]), None).await;
    let host = view.adapter_host();

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let _ = view
        .subscribe(move |event| recorded.lock().push(event.clone()))
        .await
        .unwrap();

    host.message_received(inbound(&view, "hello page", "https://good.test"));
    settle(&view).await;

    let events = events.lock();
    assert_matches!(
        &events[..],
        [WebViewEvent::MessageReceived { body, origin }]
            if body == "hello page" && origin == "https://good.test"
    );
}

#[tokio::test]
async fn message_before_enable_is_dropped() {
    let (adapter, _started) = TestAdapter::new();
    let view = new_view(adapter, WebViewConfig::default());
    let host = view.adapter_host();

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let _ = view
        .subscribe(move |event| recorded.lock().push(event.clone()))
        .await
        .unwrap();

    host.message_received(inbound(&view, "too early", "https://good.test"));
    settle(&view).await;
    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn foreign_channel_is_dropped() {
    let sink = Arc::new(RecordingSink::default());
    let (view, _transport) = bridged_view(WebViewConfig::default(), Some(Arc::clone(&sink))).await;
    let other = new_view(TestAdapter::new().0, WebViewConfig::default());
    let host = view.adapter_host();

    // A message addressed to another instance's channel.
    host.message_received(inbound(&other, "crossed wires", "https://good.test"));
    settle(&view).await;
    assert_eq!(*sink.drops.lock(), vec![DropReason::ChannelMismatch]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound RPC dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn exposed_service_answers_rpc_requests() {
    let (view, transport) = bridged_view(WebViewConfig::default(), None).await;
    let host = view.adapter_host();
    view.expose_service(echo_service()).await.unwrap();

    let request = r#"{"jsonrpc":"2.0","id":"call-1","method":"Echo.say","params":"hi"}"#;
    host.message_received(inbound(&view, request, "https://good.test"));

    let sent = transport.wait_for(1).await;
    let response: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(response["id"], json!("call-1"));
    assert_eq!(response["result"], json!("hi"));
}

#[tokio::test]
async fn unknown_method_answers_method_not_found() {
    let (view, transport) = bridged_view(WebViewConfig::default(), None).await;
    let host = view.adapter_host();

    let request = r#"{"jsonrpc":"2.0","id":"call-2","method":"Echo.missing"}"#;
    host.message_received(inbound(&view, request, "https://good.test"));

    let sent = transport.wait_for(1).await;
    let response: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(response["error"]["code"], json!(codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn removed_service_stops_answering() {
    let (view, transport) = bridged_view(WebViewConfig::default(), None).await;
    let host = view.adapter_host();
    view.expose_service(echo_service()).await.unwrap();
    view.remove_service("Echo").await.unwrap();

    let request = r#"{"jsonrpc":"2.0","id":"call-3","method":"Echo.say"}"#;
    host.message_received(inbound(&view, request, "https://good.test"));

    let sent = transport.wait_for(1).await;
    let response: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(response["error"]["code"], json!(codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn rate_limited_method_rejects_excess_calls() {
    let config = WebViewConfig {
        bridge: BridgeConfig {
            rate_limit: Some(RateLimit {
                max_calls: 1,
                window: Duration::from_secs(60),
            }),
            ..BridgeConfig::default()
        },
        ..WebViewConfig::default()
    };
    let (view, transport) = bridged_view(config, None).await;
    let host = view.adapter_host();
    view.expose_service(echo_service()).await.unwrap();

    for id in ["a", "b"] {
        let request =
            format!(r#"{{"jsonrpc":"2.0","id":"{id}","method":"Echo.say","params":"x"}}"#);
        host.message_received(inbound(&view, &request, "https://good.test"));
        // Keep the replies in request order.
        let _ = transport.wait_for(if id == "a" { 1 } else { 2 }).await;
    }

    let sent = transport.wait_for(2).await;
    let first: Value = serde_json::from_str(&sent[0]).unwrap();
    let second: Value = serde_json::from_str(&sent[1]).unwrap();
    assert_eq!(first["result"], json!("x"));
    assert_eq!(second["error"]["code"], json!(codes::RATE_LIMIT_EXCEEDED));
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound calls
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rpc_invoke_round_trips_through_the_transport() {
    let (view, transport) = bridged_view(WebViewConfig::default(), None).await;
    let host = view.adapter_host();

    let caller = view.clone();
    let call = tokio::spawn(async move { caller.rpc_invoke("page.getTitle", None).await });

    let sent = transport.wait_for(1).await;
    let request: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(request["method"], json!("page.getTitle"));
    let id = request["id"].as_str().unwrap().to_owned();

    let reply = format!(r#"{{"jsonrpc":"2.0","id":"{id}","result":"Hello"}}"#);
    host.message_received(inbound(&view, &reply, "https://good.test"));

    assert_eq!(call.await.unwrap().unwrap(), json!("Hello"));
}

#[tokio::test]
async fn rpc_invoke_without_bridge_is_rejected() {
    let (adapter, _started) = TestAdapter::new();
    let view = new_view(adapter, WebViewConfig::default());

    assert_matches!(
        view.rpc_invoke("page.getTitle", None).await,
        Err(WebViewError::NotReady(_))
    );
}

#[tokio::test]
async fn disable_bridge_restores_the_closed_state() {
    let (view, _transport) = bridged_view(WebViewConfig::default(), None).await;
    let host = view.adapter_host();
    view.expose_service(echo_service()).await.unwrap();

    view.disable_bridge().await.unwrap();

    assert_matches!(
        view.rpc_invoke("page.getTitle", None).await,
        Err(WebViewError::NotReady(_))
    );
    assert_matches!(
        view.expose_service(echo_service()).await,
        Err(WebViewError::NotReady(_))
    );

    // Inbound traffic no longer reaches subscribers.
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let _ = view
        .subscribe(move |event| recorded.lock().push(event.clone()))
        .await
        .unwrap();
    host.message_received(inbound(&view, "late", "https://good.test"));
    settle(&view).await;
    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn dispose_abandons_pending_rpc_calls() {
    let (view, transport) = bridged_view(WebViewConfig::default(), None).await;

    let caller = view.clone();
    let call = tokio::spawn(async move { caller.rpc_invoke("page.getTitle", None).await });
    let _ = transport.wait_for(1).await;

    view.dispose().await;
    assert_matches!(
        call.await.unwrap(),
        Err(WebViewError::Rpc(error)) if error.code == codes::INTERNAL_ERROR
    );
}
