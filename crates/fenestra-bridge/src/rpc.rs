//! JSON-RPC 2.0 correlation and dispatch.
//!
//! Host→peer calls mint an opaque id, park a pending entry, deliver the
//! request, and await the correlated reply under a deadline. Peer→host
//! envelopes are classified: a pending-id match resolves the waiting call;
//! otherwise a `method` member makes it a request dispatched to the handler
//! registry. Each pending entry is resolved exactly once — by response
//! arrival or deadline expiry, never both.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use fenestra_core::wire::{RawEnvelope, RpcErrorResponse, RpcRequest, RpcResponse};
use fenestra_core::{RpcCallId, RpcError};

use crate::transport::MessageTransport;

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Trait implemented by every exposed RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the request's params.
    async fn handle(&self, params: Option<Value>) -> Result<Value, RpcError>;
}

/// Adapts a synchronous closure to the async handler contract.
pub struct SyncFn<F>(F);

impl<F> SyncFn<F>
where
    F: Fn(Option<Value>) -> Result<Value, RpcError> + Send + Sync,
{
    /// Wrap a synchronous closure.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> MethodHandler for SyncFn<F>
where
    F: Fn(Option<Value>) -> Result<Value, RpcError> + Send + Sync,
{
    async fn handle(&self, params: Option<Value>) -> Result<Value, RpcError> {
        (self.0)(params)
    }
}

/// Method-name → handler table.
///
/// An explicit lookup table built at registration time; expose and remove are
/// plain insert/erase operations. Entries are independent: dispatching one
/// method never contends with registering another.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn MethodHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a method name, replacing any previous entry.
    pub fn register(&self, method: &str, handler: Arc<dyn MethodHandler>) {
        let _ = self.handlers.insert(method.to_owned(), handler);
    }

    /// Remove the handler registered under a method name, if any.
    pub fn remove(&self, method: &str) {
        let _ = self.handlers.remove(method);
    }

    /// Look up the handler for a method name.
    #[must_use]
    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.get(method).map(|entry| Arc::clone(&entry))
    }

    /// Whether a handler is registered under the method name.
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// All registered method names (sorted).
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Remove every entry. Used at teardown.
    pub fn clear(&self) {
        self.handlers.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RPC service
// ─────────────────────────────────────────────────────────────────────────────

type PendingReply = oneshot::Sender<Result<Value, RpcError>>;

/// Bidirectional JSON-RPC endpoint for one view instance.
pub struct RpcService {
    transport: Arc<dyn MessageTransport>,
    handlers: HandlerRegistry,
    pending: DashMap<String, PendingReply>,
    call_timeout: Duration,
}

impl RpcService {
    /// Create a service delivering outbound envelopes through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn MessageTransport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            handlers: HandlerRegistry::new(),
            pending: DashMap::new(),
            call_timeout,
        }
    }

    /// The handler table exposed methods are registered into.
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Number of host-initiated calls currently awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Call a peer method and await its correlated reply.
    ///
    /// Multiple calls may be outstanding concurrently; each is keyed by its
    /// own id. If the deadline elapses first the call resolves with code
    /// [`fenestra_core::codes::CALL_TIMEOUT`] and the pending entry is
    /// removed; a reply arriving later finds no entry and is ignored.
    pub async fn invoke(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let id = RpcCallId::new();
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.pending.insert(id.to_string(), reply_tx);

        counter!("rpc_calls_total", "method" => method.to_owned()).increment(1);
        debug!(%id, method, "rpc invoke");

        let request = RpcRequest::new(id.as_str(), method, params);
        match serde_json::to_string(&request) {
            Ok(text) => self.transport.deliver(&text),
            Err(e) => {
                let _ = self.pending.remove(id.as_str());
                return Err(RpcError::internal(format!(
                    "failed to serialize request for '{method}': {e}"
                )));
            }
        }

        let outcome = match tokio::time::timeout(self.call_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            // The sender is only dropped when the service is torn down.
            Ok(Err(_closed)) => Err(RpcError::internal(format!(
                "RPC call '{method}' abandoned during teardown"
            ))),
            Err(_elapsed) => {
                warn!(%id, method, "rpc call timed out");
                counter!("rpc_timeouts_total", "method" => method.to_owned()).increment(1);
                Err(RpcError::timeout(method))
            }
        };

        // Response arrival already removed the entry; the timeout and
        // teardown paths clean up here.
        let _ = self.pending.remove(id.as_str());
        outcome
    }

    /// Offer an inbound (policy-accepted) payload to the transport.
    ///
    /// Returns `true` when the payload was consumed as RPC traffic: a reply
    /// to a pending host call, or a request dispatched to a handler. Returns
    /// `false` for anything else so the caller can forward the payload to
    /// generic message subscribers.
    pub fn process_message(self: &Arc<Self>, text: &str) -> bool {
        let Some(envelope) = RawEnvelope::parse(text) else {
            return false;
        };

        // Response to a pending host→peer call?
        if let Some(id) = envelope.id.as_deref() {
            if let Some((_, reply_tx)) = self.pending.remove(id) {
                let outcome = match envelope.error {
                    Some(error) => Err(error),
                    None => Ok(envelope.result.unwrap_or(Value::Null)),
                };
                debug!(id, ok = outcome.is_ok(), "rpc reply correlated");
                let _ = reply_tx.send(outcome);
                return true;
            }
        }

        // Peer→host request?
        if let Some(method) = envelope.method {
            let service = Arc::clone(self);
            let id = envelope.id;
            let params = envelope.params;
            // Spawned so one slow handler never blocks other inbound dispatch
            // or concurrent outbound calls.
            drop(tokio::spawn(async move {
                service.dispatch_request(id, method, params).await;
            }));
            return true;
        }

        // Valid envelope, but neither a recognizable reply nor a request.
        debug!("rpc envelope without id-match or method, ignoring");
        false
    }

    /// Abandon all pending calls and drop all handlers. Idempotent.
    pub fn shutdown(&self) {
        self.pending.clear();
        self.handlers.clear();
    }

    async fn dispatch_request(&self, id: Option<String>, method: String, params: Option<Value>) {
        counter!("rpc_requests_total", "method" => method.clone()).increment(1);

        let outcome = match self.handlers.get(&method) {
            Some(handler) => handler.handle(params).await,
            None => {
                warn!(method, "rpc method not found");
                Err(RpcError::method_not_found(&method))
            }
        };

        // Requests without an id are notifications: no reply either way.
        let Some(id) = id else { return };

        let text = match outcome {
            Ok(result) => {
                let result = if result.is_null() { None } else { Some(result) };
                serde_json::to_string(&RpcResponse::new(id, result))
            }
            Err(error) => {
                counter!("rpc_errors_total", "method" => method.clone()).increment(1);
                debug!(method, code = error.code, "rpc handler error");
                serde_json::to_string(&RpcErrorResponse::new(id, error))
            }
        };

        match text {
            Ok(text) => self.transport.deliver(&text),
            Err(e) => warn!(method, error = %e, "failed to serialize rpc response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use fenestra_core::codes;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Transport that records every delivered payload.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }

        fn last_json(&self) -> Value {
            let sent = self.sent.lock();
            serde_json::from_str(sent.last().expect("nothing delivered")).unwrap()
        }
    }

    impl MessageTransport for RecordingTransport {
        fn deliver(&self, text: &str) {
            self.sent.lock().push(text.to_owned());
        }
    }

    fn service() -> (Arc<RpcService>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let service = Arc::new(RpcService::new(
            Arc::clone(&transport) as Arc<dyn MessageTransport>,
            Duration::from_secs(30),
        ));
        (service, transport)
    }

    struct EchoHandler;

    #[async_trait]
    impl MethodHandler for EchoHandler {
        async fn handle(&self, params: Option<Value>) -> Result<Value, RpcError> {
            Ok(params.unwrap_or(Value::Null))
        }
    }

    struct FailHandler;

    #[async_trait]
    impl MethodHandler for FailHandler {
        async fn handle(&self, _params: Option<Value>) -> Result<Value, RpcError> {
            Err(RpcError::new(-40000, "declared failure"))
        }
    }

    async fn settle() {
        // Let spawned dispatch tasks run to completion.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
    }

    // ── Host → peer ─────────────────────────────────────────────────

    #[tokio::test]
    async fn invoke_resolves_with_peer_result() {
        let (service, transport) = service();
        let call_service = Arc::clone(&service);
        let call = tokio::spawn(async move { call_service.invoke("js.getX", None).await });

        // Wait for the request to hit the wire, then reply with the same id.
        tokio::task::yield_now().await;
        let sent = transport.last_json();
        assert_eq!(sent["method"], "js.getX");
        let id = sent["id"].as_str().unwrap();
        let reply = format!(r#"{{"jsonrpc":"2.0","id":"{id}","result":42}}"#);
        assert!(service.process_message(&reply));

        let result = call.await.unwrap().unwrap();
        assert_eq!(result, json!(42));
        assert_eq!(service.pending_calls(), 0);
    }

    #[tokio::test]
    async fn invoke_resolves_with_peer_error() {
        let (service, transport) = service();
        let call_service = Arc::clone(&service);
        let call = tokio::spawn(async move { call_service.invoke("js.getX", None).await });

        tokio::task::yield_now().await;
        let id = transport.last_json()["id"].as_str().unwrap().to_owned();
        let reply =
            format!(r#"{{"jsonrpc":"2.0","id":"{id}","error":{{"code":-1,"message":"oops"}}}}"#);
        assert!(service.process_message(&reply));

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.code, -1);
        assert_eq!(err.message, "oops");
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_times_out_with_reserved_code() {
        let (service, _transport) = service();
        let call_service = Arc::clone(&service);
        let call = tokio::spawn(async move { call_service.invoke("js.slow", None).await });

        tokio::task::yield_now().await;
        assert_eq!(service.pending_calls(), 1);
        tokio::time::advance(Duration::from_secs(31)).await;

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.code, codes::CALL_TIMEOUT);
        assert_eq!(service.pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_after_timeout_is_ignored() {
        let (service, transport) = service();
        let call_service = Arc::clone(&service);
        let call = tokio::spawn(async move { call_service.invoke("js.slow", None).await });

        tokio::task::yield_now().await;
        let id = transport.last_json()["id"].as_str().unwrap().to_owned();
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(call.await.unwrap().is_err());

        // The entry is gone; the stale reply is not RPC traffic any more.
        let reply = format!(r#"{{"jsonrpc":"2.0","id":"{id}","result":42}}"#);
        assert!(!service.process_message(&reply));
    }

    #[tokio::test]
    async fn concurrent_invokes_are_keyed_independently() {
        let (service, transport) = service();
        let a_service = Arc::clone(&service);
        let a = tokio::spawn(async move { a_service.invoke("js.a", None).await });
        let b_service = Arc::clone(&service);
        let b = tokio::spawn(async move { b_service.invoke("js.b", None).await });

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);

        // Answer in reverse order of sending.
        for (raw, value) in sent.iter().rev().zip([json!("second"), json!("first")]) {
            let envelope: Value = serde_json::from_str(raw).unwrap();
            let id = envelope["id"].as_str().unwrap();
            let reply = format!(r#"{{"jsonrpc":"2.0","id":"{id}","result":{value}}}"#);
            assert!(service.process_message(&reply));
        }

        let first: Value = serde_json::from_str(&transport.sent()[0]).unwrap();
        let (ra, rb) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        if first["method"] == "js.a" {
            assert_eq!(ra, json!("first"));
            assert_eq!(rb, json!("second"));
        } else {
            assert_eq!(ra, json!("second"));
            assert_eq!(rb, json!("first"));
        }
    }

    // ── Peer → host ─────────────────────────────────────────────────

    #[tokio::test]
    async fn request_dispatches_to_handler_and_replies() {
        let (service, transport) = service();
        service.handlers().register("math.echo", Arc::new(EchoHandler));

        let consumed = service
            .process_message(r#"{"jsonrpc":"2.0","id":"r1","method":"math.echo","params":{"x":1}}"#);
        assert!(consumed);
        settle().await;

        let reply = transport.last_json();
        assert_eq!(reply["id"], "r1");
        assert_eq!(reply["result"]["x"], 1);
    }

    #[tokio::test]
    async fn unknown_method_replies_minus_32601() {
        let (service, transport) = service();
        assert!(service.process_message(r#"{"jsonrpc":"2.0","id":"r2","method":"no.such"}"#));
        settle().await;

        let reply = transport.last_json();
        assert_eq!(reply["id"], "r2");
        assert_eq!(reply["error"]["code"], -32601);
        assert!(reply["error"]["message"].as_str().unwrap().contains("no.such"));
    }

    #[tokio::test]
    async fn declared_handler_error_passes_code_through() {
        let (service, transport) = service();
        service.handlers().register("math.fail", Arc::new(FailHandler));

        assert!(service.process_message(r#"{"jsonrpc":"2.0","id":"r3","method":"math.fail"}"#));
        settle().await;

        let reply = transport.last_json();
        assert_eq!(reply["error"]["code"], -40000);
        assert_eq!(reply["error"]["message"], "declared failure");
    }

    #[tokio::test]
    async fn null_result_is_omitted_from_reply() {
        let (service, transport) = service();
        service.handlers().register("math.echo", Arc::new(EchoHandler));

        assert!(service.process_message(r#"{"jsonrpc":"2.0","id":"r4","method":"math.echo"}"#));
        settle().await;

        let reply = transport.last_json();
        assert_eq!(reply["id"], "r4");
        assert_matches!(reply.get("result"), None);
    }

    #[tokio::test]
    async fn notification_runs_handler_without_reply() {
        let (service, transport) = service();
        service.handlers().register("math.echo", Arc::new(EchoHandler));

        assert!(service.process_message(r#"{"jsonrpc":"2.0","method":"math.echo"}"#));
        settle().await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn non_rpc_payloads_are_not_consumed() {
        let (service, _transport) = service();
        assert!(!service.process_message("plain text"));
        assert!(!service.process_message(r#"{"kind":"app-message"}"#));
        assert!(!service.process_message(r#"{"jsonrpc":"2.0","id":"unmatched"}"#));
    }

    #[tokio::test]
    async fn sync_closures_adapt_to_async_contract() {
        let (service, transport) = service();
        service.handlers().register(
            "math.add",
            Arc::new(SyncFn::new(|params: Option<Value>| {
                let p = params.ok_or_else(|| RpcError::internal("params required"))?;
                let sum = p["a"].as_i64().unwrap_or(0) + p["b"].as_i64().unwrap_or(0);
                Ok(json!(sum))
            })),
        );

        let consumed = service.process_message(
            r#"{"jsonrpc":"2.0","id":"r5","method":"math.add","params":{"a":2,"b":3}}"#,
        );
        assert!(consumed);
        settle().await;
        assert_eq!(transport.last_json()["result"], 5);
    }

    #[tokio::test]
    async fn registry_register_and_remove() {
        let registry = HandlerRegistry::new();
        registry.register("b.method", Arc::new(EchoHandler));
        registry.register("a.method", Arc::new(EchoHandler));
        assert_eq!(registry.methods(), vec!["a.method", "b.method"]);
        assert!(registry.has_method("a.method"));

        registry.remove("a.method");
        assert!(!registry.has_method("a.method"));
        // Removing twice is a no-op.
        registry.remove("a.method");
    }
}
