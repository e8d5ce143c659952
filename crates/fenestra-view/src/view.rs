//! The public view handle.
//!
//! [`WebView`] is a cheap clonable handle onto one coordination context.
//! Every method queues an operation and awaits its result; the queue gives
//! callers on any thread a single total order. Code already running *on*
//! the context (event subscribers, interceptors) can use [`WebView::direct`]
//! for synchronous reads instead of re-entering the queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use fenestra_bridge::{DropDiagnosticsSink, MessageTransport, ServiceMethods};
use fenestra_core::{ChannelId, SubscriptionId, WebViewConfig, WebViewError};

use crate::adapter::{about_blank, NavigationAdapter, NavigationTarget};
use crate::context::{on_coordination_context, AdapterHost, Coordinator, OpKind, ViewSnapshot, ViewState};
use crate::events::{EventSubscriber, NavigationStarting, StartingInterceptor, WebViewEvent};
use crate::navigation::{NavigationCommand, NavigationStatus};

/// Smallest zoom factor the engine accepts.
pub const ZOOM_MIN: f64 = 0.25;
/// Largest zoom factor the engine accepts.
pub const ZOOM_MAX: f64 = 5.0;

/// A coordination handle for one embedded web-view surface.
///
/// Construction spawns the coordination task; the handle (and its clones)
/// submit operations to it. Dropping all handles does not tear the view
/// down — call [`WebView::dispose`].
#[derive(Clone)]
pub struct WebView {
    coordinator: Coordinator,
    snapshot: Arc<ViewSnapshot>,
    channel_id: ChannelId,
}

impl WebView {
    /// Create a view over the given engine adapter and outbound transport.
    ///
    /// Must be called within a tokio runtime; the coordination task is
    /// spawned immediately.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn NavigationAdapter>,
        transport: Arc<dyn MessageTransport>,
        config: WebViewConfig,
    ) -> Self {
        let channel_id = ChannelId::new();
        let snapshot = Arc::new(ViewSnapshot::new(about_blank()));
        let state = ViewState::new(
            adapter,
            transport,
            config,
            channel_id.clone(),
            Arc::clone(&snapshot),
        );
        let coordinator = Coordinator::spawn(state);
        Self {
            coordinator,
            snapshot,
            channel_id,
        }
    }

    /// The bridge channel this instance listens on.
    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Handle for the platform adapter to report engine activity.
    #[must_use]
    pub fn adapter_host(&self) -> AdapterHost {
        self.coordinator.adapter_host()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────────────────

    /// Navigate to a URI and wait for the terminal outcome.
    ///
    /// Starting this navigation resolves any in-flight one as
    /// [`NavigationStatus::Superseded`] first.
    pub async fn navigate(&self, uri: Url) -> Result<NavigationStatus, WebViewError> {
        let handle = self
            .coordinator
            .submit(OpKind::Navigate, move |state| {
                Box::pin(async move {
                    state
                        .start_navigation(NavigationTarget::Uri(uri), true)
                        .await
                })
            })
            .await?;
        handle.outcome().await
    }

    /// Set the source URI, navigating to it. Property-style alias of
    /// [`WebView::navigate`].
    pub async fn set_source(&self, uri: Url) -> Result<NavigationStatus, WebViewError> {
        let handle = self
            .coordinator
            .submit(OpKind::SetSource, move |state| {
                Box::pin(async move {
                    state
                        .start_navigation(NavigationTarget::Uri(uri), true)
                        .await
                })
            })
            .await?;
        handle.outcome().await
    }

    /// Load a literal HTML string, optionally resolved against a base URI.
    pub async fn navigate_to_string(
        &self,
        html: impl Into<String>,
        base: Option<Url>,
    ) -> Result<NavigationStatus, WebViewError> {
        let html = html.into();
        let handle = self
            .coordinator
            .submit(OpKind::NavigateToContent, move |state| {
                Box::pin(async move {
                    state
                        .start_navigation(NavigationTarget::Content { html, base }, true)
                        .await
                })
            })
            .await?;
        handle.outcome().await
    }

    /// Go back one history entry. `Ok(false)` when there is no back history
    /// or the engine declined.
    pub async fn go_back(&self) -> Result<bool, WebViewError> {
        self.coordinator
            .submit(OpKind::Back, move |state| {
                Box::pin(async move { state.run_command(NavigationCommand::Back).await })
            })
            .await
    }

    /// Go forward one history entry. `Ok(false)` when there is no forward
    /// history or the engine declined.
    pub async fn go_forward(&self) -> Result<bool, WebViewError> {
        self.coordinator
            .submit(OpKind::Forward, move |state| {
                Box::pin(async move { state.run_command(NavigationCommand::Forward).await })
            })
            .await
    }

    /// Reload the current document. `Ok(false)` when the engine declined.
    pub async fn refresh(&self) -> Result<bool, WebViewError> {
        self.coordinator
            .submit(OpKind::Refresh, move |state| {
                Box::pin(async move { state.run_command(NavigationCommand::Refresh).await })
            })
            .await
    }

    /// Abort the active navigation, resolving it as canceled. Returns
    /// whether one was aborted.
    pub async fn stop(&self) -> Result<bool, WebViewError> {
        self.coordinator
            .submit(OpKind::Stop, move |state| {
                Box::pin(async move { state.stop_active().await })
            })
            .await
    }

    /// Evaluate a script in the page, returning its serialized result.
    pub async fn run_script(
        &self,
        script: impl Into<String>,
    ) -> Result<Option<String>, WebViewError> {
        let script = script.into();
        self.coordinator
            .submit(OpKind::RunScript, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    state
                        .adapter
                        .run_script(&script)
                        .await
                        .map_err(|err| WebViewError::adapter(err.to_string()))
                })
            })
            .await
    }

    /// The engine's current zoom factor, read through the queue.
    pub async fn zoom(&self) -> Result<f64, WebViewError> {
        self.coordinator
            .submit(OpKind::ReadState, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    Ok(state.adapter.zoom())
                })
            })
            .await
    }

    /// Set the zoom factor, clamped to `[ZOOM_MIN, ZOOM_MAX]`. Returns the
    /// factor actually applied.
    pub async fn set_zoom(&self, factor: f64) -> Result<f64, WebViewError> {
        let clamped = factor.clamp(ZOOM_MIN, ZOOM_MAX);
        self.coordinator
            .submit(OpKind::Zoom, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    state
                        .adapter
                        .set_zoom(clamped)
                        .await
                        .map_err(|err| WebViewError::adapter(err.to_string()))?;
                    Ok(clamped)
                })
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // State reads
    // ─────────────────────────────────────────────────────────────────────

    /// The current source URI, read through the queue.
    pub async fn source(&self) -> Result<Url, WebViewError> {
        self.coordinator
            .submit(OpKind::ReadState, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    Ok(state.source.clone())
                })
            })
            .await
    }

    /// Whether a navigation is in flight, read through the queue.
    pub async fn is_loading(&self) -> Result<bool, WebViewError> {
        self.coordinator
            .submit(OpKind::ReadState, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    Ok(state.active.is_some())
                })
            })
            .await
    }

    /// Synchronous reads for code already on the coordination context.
    ///
    /// Fails with [`WebViewError::DispatchFailed`] anywhere else; off-context
    /// callers go through the queued async reads instead.
    pub fn direct(&self) -> Result<DirectView<'_>, WebViewError> {
        if !on_coordination_context() {
            return Err(WebViewError::dispatch(
                "direct access requires the coordination context",
            ));
        }
        Ok(DirectView { view: self })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribe to view events. The returned token removes exactly this
    /// subscription.
    pub async fn subscribe(
        &self,
        subscriber: impl Fn(&WebViewEvent) + Send + 'static,
    ) -> Result<SubscriptionId, WebViewError> {
        let subscriber: EventSubscriber = Box::new(subscriber);
        self.coordinator
            .submit(OpKind::Subscribe, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    Ok(state.subscribers.add_event(subscriber))
                })
            })
            .await
    }

    /// Intercept navigations before they start; the interceptor may cancel.
    pub async fn on_navigation_starting(
        &self,
        interceptor: impl FnMut(&mut NavigationStarting) + Send + 'static,
    ) -> Result<SubscriptionId, WebViewError> {
        let interceptor: StartingInterceptor = Box::new(interceptor);
        self.coordinator
            .submit(OpKind::Subscribe, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    Ok(state.subscribers.add_starting(interceptor))
                })
            })
            .await
    }

    /// Remove a subscription or interceptor by token. Idempotent.
    pub async fn unsubscribe(&self, token: SubscriptionId) -> Result<(), WebViewError> {
        self.coordinator
            .submit(OpKind::Unsubscribe, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    state.subscribers.remove(&token);
                    Ok(())
                })
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bridge
    // ─────────────────────────────────────────────────────────────────────

    /// Enable the message bridge with this instance's configured policy.
    /// Idempotent while enabled.
    pub async fn enable_bridge(
        &self,
        diagnostics: Option<Arc<dyn DropDiagnosticsSink>>,
    ) -> Result<(), WebViewError> {
        self.coordinator
            .submit(OpKind::EnableBridge, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    state.enable_bridge(diagnostics);
                    Ok(())
                })
            })
            .await
    }

    /// Disable the message bridge, cancelling pending calls and removing
    /// every exposed service. Idempotent.
    pub async fn disable_bridge(&self) -> Result<(), WebViewError> {
        self.coordinator
            .submit(OpKind::DisableBridge, move |state| {
                Box::pin(async move {
                    state.ensure_alive()?;
                    state.disable_bridge();
                    Ok(())
                })
            })
            .await
    }

    /// Expose a named service to the page. Re-exposing a name replaces its
    /// member table.
    pub async fn expose_service(&self, methods: ServiceMethods) -> Result<(), WebViewError> {
        self.coordinator
            .submit(OpKind::ExposeService, move |state| {
                Box::pin(async move {
                    state.bridge_services()?.expose(methods);
                    Ok(())
                })
            })
            .await
    }

    /// Remove a named service and all of its members. Idempotent.
    pub async fn remove_service(&self, name: impl Into<String>) -> Result<(), WebViewError> {
        let name = name.into();
        self.coordinator
            .submit(OpKind::RemoveService, move |state| {
                Box::pin(async move {
                    state.bridge_services()?.remove(&name);
                    Ok(())
                })
            })
            .await
    }

    /// Call a method on the page and wait for its reply under the configured
    /// deadline.
    pub async fn rpc_invoke(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Value, WebViewError> {
        let method = method.into();
        let rpc = self
            .coordinator
            .submit(OpKind::RpcInvoke, move |state| {
                Box::pin(async move { state.rpc() })
            })
            .await?;
        // The call itself runs off the queue so replies can drain through it.
        rpc.invoke(&method, params).await.map_err(WebViewError::from)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Tear the view down.
    ///
    /// Faults the active navigation, drops the bridge, and silences all
    /// subscribers; no events are raised. Idempotent, and safe to race.
    pub async fn dispose(&self) {
        self.coordinator.dispose().await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Blocking wrappers
    // ─────────────────────────────────────────────────────────────────────

    /// Blocking form of [`WebView::navigate`] for synchronous callers.
    ///
    /// Refuses to run on the coordination context, where blocking would
    /// deadlock the queue that has to resolve the navigation.
    pub fn navigate_blocking(&self, uri: Url) -> Result<NavigationStatus, WebViewError> {
        self.guard_blocking("navigate_blocking")?;
        futures::executor::block_on(self.navigate(uri))
    }

    /// Blocking form of [`WebView::run_script`] for synchronous callers.
    ///
    /// Refuses to run on the coordination context.
    pub fn run_script_blocking(
        &self,
        script: impl Into<String>,
    ) -> Result<Option<String>, WebViewError> {
        self.guard_blocking("run_script_blocking")?;
        futures::executor::block_on(self.run_script(script))
    }

    fn guard_blocking(&self, what: &str) -> Result<(), WebViewError> {
        if on_coordination_context() {
            return Err(WebViewError::dispatch(format!(
                "{what} would deadlock the coordination context"
            )));
        }
        Ok(())
    }
}

/// Synchronous state reads for code running on the coordination context.
pub struct DirectView<'a> {
    view: &'a WebView,
}

impl std::fmt::Debug for DirectView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectView").finish_non_exhaustive()
    }
}

impl DirectView<'_> {
    /// The current source URI.
    #[must_use]
    pub fn source(&self) -> Url {
        self.view.snapshot.source.lock().clone()
    }

    /// Whether a navigation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.view.snapshot.is_loading.load(Ordering::Acquire)
    }

    /// The bridge channel this instance listens on.
    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        &self.view.channel_id
    }
}
