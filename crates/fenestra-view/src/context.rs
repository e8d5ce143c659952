//! The coordination context: one task owning all mutable view state.
//!
//! Every operation and every engine signal funnels into a single unbounded
//! queue drained by one actor task. The drain order is the submission order,
//! which gives the whole view a global FIFO: callers on any thread observe
//! navigations, events, and bridge changes in one total order.
//!
//! Queued operation bodies borrow the state for the duration of one drain
//! step. Bodies that must wait for something that arrives *through the
//! queue* (a navigation completion, an RPC reply) return a handle and let
//! the caller await it outside the loop — awaiting it inside would deadlock
//! the very queue that delivers the answer.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};
use url::Url;

use fenestra_bridge::{
    BridgeService, DropDiagnostic, DropDiagnosticsSink, InboundMessage, MessagePolicy,
    MessageTransport, PolicyDecision, RpcService,
};
use fenestra_core::{ChannelId, NavigationError, WebViewConfig, WebViewError};

use crate::adapter::{CompletionReport, NavigationAdapter, NavigationStartReport, StartDecision};
use crate::events::{PermissionKind, Subscribers, WebViewEvent};
use crate::navigation::NavigationOperation;

tokio::task_local! {
    static ON_CONTEXT: ();
}

/// Whether the current task is the coordination context itself.
pub(crate) fn on_coordination_context() -> bool {
    ON_CONTEXT.try_with(|()| ()).is_ok()
}

const PHASE_READY: u8 = 0;
const PHASE_TEARING_DOWN: u8 = 1;
const PHASE_DISPOSED: u8 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Queue plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// What a queued operation does, for tracing.
#[derive(Clone, Copy, Debug)]
pub(crate) enum OpKind {
    Navigate,
    SetSource,
    NavigateToContent,
    Back,
    Forward,
    Refresh,
    Stop,
    RunScript,
    Zoom,
    ReadState,
    Subscribe,
    Unsubscribe,
    EnableBridge,
    DisableBridge,
    ExposeService,
    RemoveService,
    RpcInvoke,
    Dispose,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Navigate => "navigate",
            Self::SetSource => "set-source",
            Self::NavigateToContent => "navigate-to-content",
            Self::Back => "back",
            Self::Forward => "forward",
            Self::Refresh => "refresh",
            Self::Stop => "stop",
            Self::RunScript => "run-script",
            Self::Zoom => "zoom",
            Self::ReadState => "read-state",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::EnableBridge => "enable-bridge",
            Self::DisableBridge => "disable-bridge",
            Self::ExposeService => "expose-service",
            Self::RemoveService => "remove-service",
            Self::RpcInvoke => "rpc-invoke",
            Self::Dispose => "dispose",
        };
        f.write_str(name)
    }
}

type OpBody = Box<dyn for<'a> FnOnce(&'a mut ViewState) -> BoxFuture<'a, ()> + Send>;

fn erase<F>(body: F) -> OpBody
where
    F: for<'a> FnOnce(&'a mut ViewState) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(body)
}

pub(crate) struct QueuedOperation {
    seq: u64,
    kind: OpKind,
    body: OpBody,
}

/// Engine activity reported into the queue by the adapter host.
pub(crate) enum AdapterSignal {
    NavigationStarting {
        report: NavigationStartReport,
        reply: oneshot::Sender<StartDecision>,
    },
    NavigationCompleted(CompletionReport),
    MessageReceived(InboundMessage),
    NewWindowRequested {
        uri: Url,
    },
    DownloadRequested {
        uri: Url,
        suggested_filename: String,
    },
    PermissionRequested {
        kind: PermissionKind,
        origin: String,
    },
    ZoomChanged {
        factor: f64,
    },
    ResourceRequested {
        uri: Url,
    },
    EnvironmentReady,
}

pub(crate) enum Submission {
    Operation(QueuedOperation),
    Signal(AdapterSignal),
}

struct Shared {
    tx: mpsc::UnboundedSender<Submission>,
    phase: AtomicU8,
    next_seq: AtomicU64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Cheap handle onto the coordination queue.
#[derive(Clone)]
pub(crate) struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Spawn the actor task that owns `state` and drains the queue.
    pub(crate) fn spawn(state: ViewState) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            tx,
            phase: AtomicU8::new(PHASE_READY),
            next_seq: AtomicU64::new(0),
        });
        let _ = tokio::spawn(ON_CONTEXT.scope((), run(state, rx)));
        Self { shared }
    }

    /// Queue one operation and wait for its result.
    ///
    /// Rejected up front, without queueing, when the lifecycle phase forbids
    /// new operations.
    pub(crate) async fn submit<T, F>(&self, kind: OpKind, body: F) -> Result<T, WebViewError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut ViewState) -> BoxFuture<'a, Result<T, WebViewError>>
            + Send
            + 'static,
    {
        match self.shared.phase.load(Ordering::Acquire) {
            PHASE_READY => {}
            PHASE_TEARING_DOWN => {
                return Err(WebViewError::not_ready("teardown is in progress"));
            }
            _ => return Err(WebViewError::Disposed),
        }

        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let erased = erase(move |state| {
            Box::pin(async move {
                let result = body(state).await;
                let _ = done_tx.send(result);
            })
        });
        self.shared
            .tx
            .send(Submission::Operation(QueuedOperation {
                seq,
                kind,
                body: erased,
            }))
            .map_err(|_| WebViewError::Disposed)?;

        match done_rx.await {
            Ok(result) => result,
            Err(_) => Err(WebViewError::dispatch("coordination loop dropped the operation")),
        }
    }

    /// Tear the view down. Idempotent; later calls return immediately.
    ///
    /// The teardown itself runs as a queued operation, behind everything
    /// already submitted, while the phase flag rejects anything newer.
    pub(crate) async fn dispose(&self) {
        if self
            .shared
            .phase
            .compare_exchange(
                PHASE_READY,
                PHASE_TEARING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let body = erase(move |state| {
            Box::pin(async move {
                state.teardown();
                let _ = done_tx.send(());
            })
        });
        if self
            .shared
            .tx
            .send(Submission::Operation(QueuedOperation {
                seq,
                kind: OpKind::Dispose,
                body,
            }))
            .is_ok()
        {
            let _ = done_rx.await;
        }
        self.shared.phase.store(PHASE_DISPOSED, Ordering::Release);
    }

    /// Handle for the platform adapter to report engine activity.
    pub(crate) fn adapter_host(&self) -> AdapterHost {
        AdapterHost {
            shared: Arc::clone(&self.shared),
        }
    }
}

async fn run(mut state: ViewState, mut rx: mpsc::UnboundedReceiver<Submission>) {
    while let Some(submission) = rx.recv().await {
        match submission {
            Submission::Operation(op) => {
                trace!(seq = op.seq, kind = %op.kind, "running queued operation");
                (op.body)(&mut state).await;
            }
            Submission::Signal(signal) => state.handle_signal(signal),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapter host
// ─────────────────────────────────────────────────────────────────────────────

/// The handle a platform adapter uses to report engine activity into the
/// coordination context.
///
/// Reports are dropped once teardown has begun; the engine outlives the
/// coordination state by an arbitrary margin and must never fault it.
#[derive(Clone)]
pub struct AdapterHost {
    shared: Arc<Shared>,
}

impl AdapterHost {
    fn send(&self, signal: AdapterSignal) -> bool {
        if self.shared.phase.load(Ordering::Acquire) != PHASE_READY {
            trace!("engine signal dropped: view is shutting down");
            return false;
        }
        self.shared.tx.send(Submission::Signal(signal)).is_ok()
    }

    /// Report an engine-observed navigation start and wait for the verdict.
    ///
    /// Returns a denial if the view is gone rather than erroring: the engine
    /// only needs to know whether to proceed.
    pub async fn navigation_starting(&self, report: NavigationStartReport) -> StartDecision {
        let (reply_tx, reply_rx) = oneshot::channel();
        if !self.send(AdapterSignal::NavigationStarting {
            report,
            reply: reply_tx,
        }) {
            return StartDecision::deny();
        }
        reply_rx.await.unwrap_or_else(|_| StartDecision::deny())
    }

    /// Report a terminal state for a tracked navigation.
    pub fn navigation_completed(&self, report: CompletionReport) {
        let _ = self.send(AdapterSignal::NavigationCompleted(report));
    }

    /// Report one inbound message from the page.
    pub fn message_received(&self, message: InboundMessage) {
        let _ = self.send(AdapterSignal::MessageReceived(message));
    }

    /// Report a request for a new top-level window.
    pub fn new_window_requested(&self, uri: Url) {
        let _ = self.send(AdapterSignal::NewWindowRequested { uri });
    }

    /// Report the start of a file download.
    pub fn download_requested(&self, uri: Url, suggested_filename: impl Into<String>) {
        let _ = self.send(AdapterSignal::DownloadRequested {
            uri,
            suggested_filename: suggested_filename.into(),
        });
    }

    /// Report a page permission request.
    pub fn permission_requested(&self, kind: PermissionKind, origin: impl Into<String>) {
        let _ = self.send(AdapterSignal::PermissionRequested {
            kind,
            origin: origin.into(),
        });
    }

    /// Report a zoom factor change.
    pub fn zoom_changed(&self, factor: f64) {
        let _ = self.send(AdapterSignal::ZoomChanged { factor });
    }

    /// Report a sub-resource fetch.
    pub fn resource_requested(&self, uri: Url) {
        let _ = self.send(AdapterSignal::ResourceRequested { uri });
    }

    /// Report that the engine environment finished initializing.
    pub fn environment_ready(&self) {
        let _ = self.send(AdapterSignal::EnvironmentReady);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context-owned state
// ─────────────────────────────────────────────────────────────────────────────

/// Lock-light mirror of context-owned fields for same-context reads.
pub(crate) struct ViewSnapshot {
    pub(crate) source: Mutex<Url>,
    pub(crate) is_loading: AtomicBool,
}

impl ViewSnapshot {
    pub(crate) fn new(source: Url) -> Self {
        Self {
            source: Mutex::new(source),
            is_loading: AtomicBool::new(false),
        }
    }
}

/// Bridge machinery, present only while the bridge is enabled.
pub(crate) struct BridgeState {
    pub(crate) policy: MessagePolicy,
    pub(crate) rpc: Arc<RpcService>,
    pub(crate) services: Arc<BridgeService>,
    pub(crate) diagnostics: Option<Arc<dyn DropDiagnosticsSink>>,
}

/// All mutable view state, owned exclusively by the actor task.
pub(crate) struct ViewState {
    pub(crate) adapter: Arc<dyn NavigationAdapter>,
    pub(crate) transport: Arc<dyn MessageTransport>,
    pub(crate) config: WebViewConfig,
    pub(crate) channel_id: ChannelId,
    pub(crate) source: Url,
    pub(crate) active: Option<NavigationOperation>,
    pub(crate) subscribers: Subscribers,
    pub(crate) bridge: Option<BridgeState>,
    pub(crate) destroyed: bool,
    snapshot: Arc<ViewSnapshot>,
}

impl ViewState {
    pub(crate) fn new(
        adapter: Arc<dyn NavigationAdapter>,
        transport: Arc<dyn MessageTransport>,
        config: WebViewConfig,
        channel_id: ChannelId,
        snapshot: Arc<ViewSnapshot>,
    ) -> Self {
        let source = snapshot.source.lock().clone();
        Self {
            adapter,
            transport,
            config,
            channel_id,
            source,
            active: None,
            subscribers: Subscribers::default(),
            bridge: None,
            destroyed: false,
            snapshot,
        }
    }

    pub(crate) fn ensure_alive(&self) -> Result<(), WebViewError> {
        if self.destroyed {
            Err(WebViewError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Update the tracked source URI and its cross-thread mirror.
    pub(crate) fn set_source_internal(&mut self, uri: Url) {
        *self.snapshot.source.lock() = uri.clone();
        self.source = uri;
    }

    pub(crate) fn install_active(&mut self, operation: NavigationOperation) {
        self.active = Some(operation);
        self.mark_loading(true);
    }

    pub(crate) fn mark_loading(&self, loading: bool) {
        self.snapshot.is_loading.store(loading, Ordering::Release);
    }

    /// Deliver an event to subscribers. The teardown check is here, at the
    /// moment of delivery, because teardown may have run between a signal's
    /// enqueue and its drain.
    pub(crate) fn deliver(&self, event: WebViewEvent) {
        if self.destroyed {
            return;
        }
        self.subscribers.deliver(&event);
    }

    fn handle_signal(&mut self, signal: AdapterSignal) {
        match signal {
            AdapterSignal::NavigationStarting { report, reply } => {
                let decision = self.native_navigation_starting(&report);
                let _ = reply.send(decision);
            }
            AdapterSignal::NavigationCompleted(report) => self.navigation_completed(report),
            AdapterSignal::MessageReceived(message) => self.message_received(message),
            AdapterSignal::NewWindowRequested { uri } => {
                self.deliver(WebViewEvent::NewWindowRequested { uri });
            }
            AdapterSignal::DownloadRequested {
                uri,
                suggested_filename,
            } => {
                self.deliver(WebViewEvent::DownloadRequested {
                    uri,
                    suggested_filename,
                });
            }
            AdapterSignal::PermissionRequested { kind, origin } => {
                self.deliver(WebViewEvent::PermissionRequested { kind, origin });
            }
            AdapterSignal::ZoomChanged { factor } => {
                self.deliver(WebViewEvent::ZoomChanged { factor });
            }
            AdapterSignal::ResourceRequested { uri } => {
                self.deliver(WebViewEvent::ResourceRequested { uri });
            }
            AdapterSignal::EnvironmentReady => {
                self.deliver(WebViewEvent::EnvironmentReady);
            }
        }
    }

    /// Run one inbound message through the gate, the RPC layer, and finally
    /// the generic subscribers.
    fn message_received(&mut self, message: InboundMessage) {
        if self.destroyed {
            return;
        }
        let Some(bridge) = &self.bridge else {
            debug!("inbound message dropped: bridge not enabled");
            return;
        };
        match bridge.policy.evaluate(&message) {
            PolicyDecision::Allow => {
                if bridge.rpc.process_message(&message.body) {
                    return;
                }
                self.deliver(WebViewEvent::MessageReceived {
                    body: message.body,
                    origin: message.origin,
                });
            }
            PolicyDecision::Deny(reason) => {
                debug!(?reason, origin = message.origin, "inbound message dropped by policy");
                if let Some(sink) = &bridge.diagnostics {
                    sink.message_dropped(&DropDiagnostic {
                        reason,
                        origin: message.origin,
                        channel_id: message.channel_id,
                    });
                }
            }
        }
    }

    /// Construct the bridge machinery for this instance. Idempotent.
    pub(crate) fn enable_bridge(&mut self, diagnostics: Option<Arc<dyn DropDiagnosticsSink>>) {
        if self.bridge.is_some() {
            return;
        }
        let policy = MessagePolicy::new(&self.config.bridge, self.channel_id.clone());
        let rpc = Arc::new(RpcService::new(
            Arc::clone(&self.transport),
            self.config.rpc_call_timeout,
        ));
        let services = Arc::new(BridgeService::new(
            Arc::clone(&rpc),
            self.config.bridge.rate_limit,
        ));
        self.bridge = Some(BridgeState {
            policy,
            rpc,
            services,
            diagnostics,
        });
        debug!(channel_id = %self.channel_id, "message bridge enabled");
    }

    /// Tear the bridge machinery down. Idempotent.
    pub(crate) fn disable_bridge(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.services.clear();
            bridge.rpc.shutdown();
            debug!(channel_id = %self.channel_id, "message bridge disabled");
        }
    }

    pub(crate) fn rpc(&self) -> Result<Arc<RpcService>, WebViewError> {
        self.ensure_alive()?;
        self.bridge
            .as_ref()
            .map(|bridge| Arc::clone(&bridge.rpc))
            .ok_or_else(|| WebViewError::not_ready("the message bridge is not enabled"))
    }

    pub(crate) fn bridge_services(&self) -> Result<Arc<BridgeService>, WebViewError> {
        self.ensure_alive()?;
        self.bridge
            .as_ref()
            .map(|bridge| Arc::clone(&bridge.services))
            .ok_or_else(|| WebViewError::not_ready("the message bridge is not enabled"))
    }

    /// Final transition: fault the active navigation, drop the bridge, and
    /// silence all subscribers. Raises no events.
    pub(crate) fn teardown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Some(mut active) = self.active.take() {
            let fault = NavigationError::disposed(
                active.navigation_id.clone(),
                active.request_uri.clone(),
            );
            active.resolve(Err(fault));
        }
        self.mark_loading(false);
        if let Some(bridge) = self.bridge.take() {
            bridge.services.clear();
            bridge.rpc.shutdown();
        }
        self.subscribers.clear();
        debug!(channel_id = %self.channel_id, "web view torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_tasks_are_off_context() {
        assert!(!on_coordination_context());
        let inside = tokio::spawn(async { on_coordination_context() });
        assert!(!inside.await.unwrap());
    }

    #[tokio::test]
    async fn context_marker_is_scoped() {
        let marked = tokio::spawn(ON_CONTEXT.scope((), async { on_coordination_context() }));
        assert!(marked.await.unwrap());
    }
}
