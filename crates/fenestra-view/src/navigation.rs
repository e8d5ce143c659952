//! Navigation tracking: the at-most-one active operation and its lifecycle.
//!
//! A view tracks at most one navigation at a time. Starting a new one first
//! resolves the previous as [`NavigationStatus::Superseded`]; completion
//! reports that do not name the active operation are dropped. Every terminal
//! transition runs on the coordination context, so observers see starts and
//! completions in a single total order.

use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use fenestra_core::{
    CorrelationId, NavigationError, NavigationErrorKind, NavigationId, WebViewError,
};

use crate::adapter::{
    CompletionDisposition, CompletionReport, NavigationStartReport, NavigationTarget,
    StartDecision,
};
use crate::context::ViewState;
use crate::events::{NavigationStarting, WebViewEvent};

/// Terminal status of a navigation that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationStatus {
    /// The document loaded.
    Success,
    /// The load was canceled — by an interceptor, a stop command, or the
    /// engine declining a history command.
    Canceled,
    /// A newer navigation replaced this one before it finished.
    Superseded,
}

pub(crate) type NavigationOutcome = Result<NavigationStatus, NavigationError>;

/// History commands routed through the tracked-navigation lifecycle.
#[derive(Clone, Copy, Debug)]
pub(crate) enum NavigationCommand {
    Back,
    Forward,
    Refresh,
}

/// The single in-flight navigation a view tracks.
pub(crate) struct NavigationOperation {
    pub(crate) navigation_id: NavigationId,
    pub(crate) correlation_id: CorrelationId,
    pub(crate) request_uri: Url,
    resolver: Option<oneshot::Sender<NavigationOutcome>>,
}

impl NavigationOperation {
    pub(crate) fn new(
        navigation_id: NavigationId,
        correlation_id: CorrelationId,
        request_uri: Url,
    ) -> (Self, CompletionHandle) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                navigation_id,
                correlation_id,
                request_uri,
                resolver: Some(tx),
            },
            CompletionHandle(rx),
        )
    }

    /// Resolve at most once; later resolutions are ignored.
    pub(crate) fn resolve(&mut self, outcome: NavigationOutcome) {
        if let Some(resolver) = self.resolver.take() {
            let _ = resolver.send(outcome);
        }
    }
}

/// Awaits one navigation's terminal outcome, off the operation queue.
///
/// The queued operation that starts a navigation finishes as soon as the
/// engine has been asked to load; the terminal outcome arrives later, via
/// this handle, so completion signals can drain through the queue while the
/// caller waits.
pub(crate) struct CompletionHandle(oneshot::Receiver<NavigationOutcome>);

impl CompletionHandle {
    /// Wait for the navigation to reach a terminal state.
    pub(crate) async fn outcome(self) -> Result<NavigationStatus, WebViewError> {
        match self.0.await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(cause)) => Err(WebViewError::Navigation(cause)),
            Err(_) => Err(WebViewError::Disposed),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State machine
// ─────────────────────────────────────────────────────────────────────────────

impl ViewState {
    /// Begin a caller-initiated navigation.
    ///
    /// Supersedes any active operation, raises the cancelable starting
    /// signal, then asks the adapter to load. The returned handle resolves
    /// when the navigation reaches a terminal state.
    pub(crate) async fn start_navigation(
        &mut self,
        target: NavigationTarget,
        update_source: bool,
    ) -> Result<CompletionHandle, WebViewError> {
        self.ensure_alive()?;
        let request_uri = target.request_uri();
        if update_source {
            self.set_source_internal(request_uri.clone());
        }
        self.supersede_active();

        let navigation_id = NavigationId::new();
        let correlation_id = CorrelationId::from(&navigation_id);
        let (operation, handle) = NavigationOperation::new(
            navigation_id.clone(),
            correlation_id,
            request_uri.clone(),
        );
        self.install_active(operation);
        debug!(%navigation_id, uri = %request_uri, "navigation started");

        if self.raise_starting(&navigation_id, &request_uri) {
            self.complete_active(Ok(NavigationStatus::Canceled));
            return Ok(handle);
        }

        let invoked = match &target {
            NavigationTarget::Uri(uri) => self.adapter.navigate(&navigation_id, uri).await,
            NavigationTarget::Content { html, .. } => {
                self.adapter
                    .navigate_to_content(&navigation_id, html, &request_uri)
                    .await
            }
        };
        if let Err(err) = invoked {
            warn!(%navigation_id, error = %err, "adapter rejected navigation");
            let cause = NavigationError::new(
                NavigationErrorKind::Other,
                navigation_id,
                request_uri,
                err.to_string(),
            );
            self.complete_active(Err(cause));
        }
        Ok(handle)
    }

    /// Run a history command through the tracked-navigation lifecycle.
    ///
    /// Returns `Ok(false)` without touching the active operation when the
    /// engine has no matching history entry. A declined command resolves the
    /// freshly tracked navigation as canceled.
    pub(crate) async fn run_command(
        &mut self,
        command: NavigationCommand,
    ) -> Result<bool, WebViewError> {
        self.ensure_alive()?;
        match command {
            NavigationCommand::Back if !self.adapter.can_go_back() => return Ok(false),
            NavigationCommand::Forward if !self.adapter.can_go_forward() => return Ok(false),
            _ => {}
        }

        self.supersede_active();
        let navigation_id = NavigationId::new();
        let correlation_id = CorrelationId::from(&navigation_id);
        let uri = self.source.clone();
        let (operation, _handle) =
            NavigationOperation::new(navigation_id.clone(), correlation_id, uri.clone());
        self.install_active(operation);

        if self.raise_starting(&navigation_id, &uri) {
            self.complete_active(Ok(NavigationStatus::Canceled));
            return Ok(false);
        }

        let accepted = match command {
            NavigationCommand::Back => self.adapter.go_back(&navigation_id).await,
            NavigationCommand::Forward => self.adapter.go_forward(&navigation_id).await,
            NavigationCommand::Refresh => self.adapter.refresh(&navigation_id).await,
        };
        match accepted {
            Ok(true) => Ok(true),
            Ok(false) => {
                debug!(%navigation_id, ?command, "engine declined history command");
                self.complete_active(Ok(NavigationStatus::Canceled));
                Ok(false)
            }
            Err(err) => {
                self.complete_active(Ok(NavigationStatus::Canceled));
                Err(WebViewError::adapter(err.to_string()))
            }
        }
    }

    /// Abort the active navigation, if any. Returns whether one was aborted.
    pub(crate) async fn stop_active(&mut self) -> Result<bool, WebViewError> {
        self.ensure_alive()?;
        if self.active.is_none() {
            return Ok(false);
        }
        self.adapter.stop().await;
        self.complete_active(Ok(NavigationStatus::Canceled));
        Ok(true)
    }

    /// Map an engine-observed navigation start onto the tracked state.
    ///
    /// - Same correlation, same URI: the engine re-observed the request the
    ///   core already tracks. Reuse the operation; no second starting signal.
    /// - Same correlation, different URI: a redirect hop. Retarget the
    ///   operation in place and raise one starting signal for the new URI.
    /// - Anything else on the main frame: an engine-initiated navigation.
    ///   Supersede and track it under a fresh identity, adopting the
    ///   engine's correlation.
    pub(crate) fn native_navigation_starting(
        &mut self,
        report: &NavigationStartReport,
    ) -> StartDecision {
        if self.destroyed {
            return StartDecision::deny();
        }
        if !report.is_main_frame {
            return StartDecision::allow(None);
        }

        let correlated = self.active.as_mut().and_then(|active| {
            (active.correlation_id == report.correlation_id).then(|| {
                let same_uri = active.request_uri == report.uri;
                if !same_uri {
                    active.request_uri = report.uri.clone();
                }
                (active.navigation_id.clone(), same_uri)
            })
        });

        match correlated {
            Some((navigation_id, true)) => StartDecision::allow(Some(navigation_id)),
            Some((navigation_id, false)) => {
                debug!(%navigation_id, uri = %report.uri, "navigation redirected");
                self.set_source_internal(report.uri.clone());
                if self.raise_starting(&navigation_id, &report.uri) {
                    self.complete_active(Ok(NavigationStatus::Canceled));
                    return StartDecision::deny();
                }
                StartDecision::allow(Some(navigation_id))
            }
            None => {
                self.supersede_active();
                let navigation_id = NavigationId::new();
                let (operation, _handle) = NavigationOperation::new(
                    navigation_id.clone(),
                    report.correlation_id.clone(),
                    report.uri.clone(),
                );
                self.install_active(operation);
                self.set_source_internal(report.uri.clone());
                debug!(%navigation_id, uri = %report.uri, "engine-initiated navigation tracked");

                if self.raise_starting(&navigation_id, &report.uri) {
                    self.complete_active(Ok(NavigationStatus::Canceled));
                    return StartDecision::deny();
                }
                StartDecision::allow(Some(navigation_id))
            }
        }
    }

    /// Apply an engine completion report to the tracked state.
    ///
    /// Reports for anything other than the active operation are dropped. A
    /// failure report without a categorized cause gets a synthesized one.
    pub(crate) fn navigation_completed(&mut self, report: CompletionReport) {
        if self.destroyed {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            debug!(
                navigation_id = %report.navigation_id,
                "completion report dropped: no active navigation"
            );
            return;
        };
        if active.navigation_id != report.navigation_id {
            debug!(
                reported = %report.navigation_id,
                active = %active.navigation_id,
                "completion report dropped: stale navigation id"
            );
            return;
        }
        active.request_uri = report.uri.clone();

        let outcome = match report.disposition {
            CompletionDisposition::Success => Ok(NavigationStatus::Success),
            CompletionDisposition::Canceled => Ok(NavigationStatus::Canceled),
            CompletionDisposition::Failure(Some(cause)) => Err(cause),
            CompletionDisposition::Failure(None) => {
                Err(NavigationError::generic(report.navigation_id, report.uri))
            }
        };
        self.complete_active(outcome);
    }

    /// Resolve the active operation as superseded, if one exists.
    pub(crate) fn supersede_active(&mut self) {
        if self.active.is_some() {
            self.complete_active(Ok(NavigationStatus::Superseded));
        }
    }

    /// Resolve and clear the active operation: completion event first, then
    /// the awaiting caller, so an observer never sees a resolved handle
    /// before the event.
    pub(crate) fn complete_active(&mut self, outcome: NavigationOutcome) {
        let Some(mut operation) = self.active.take() else {
            return;
        };
        self.mark_loading(false);
        debug!(
            navigation_id = %operation.navigation_id,
            outcome = ?outcome,
            "navigation completed"
        );
        self.deliver(WebViewEvent::NavigationCompleted {
            navigation_id: operation.navigation_id.clone(),
            uri: operation.request_uri.clone(),
            result: outcome.clone(),
        });
        operation.resolve(outcome);
    }

    /// Raise the cancelable starting signal and the started event.
    /// Returns whether an interceptor canceled the navigation.
    fn raise_starting(&mut self, navigation_id: &NavigationId, uri: &Url) -> bool {
        let mut starting = NavigationStarting::new(navigation_id.clone(), uri.clone());
        self.subscribers.intercept(&mut starting);
        self.deliver(WebViewEvent::NavigationStarted {
            navigation_id: navigation_id.clone(),
            uri: uri.clone(),
        });
        starting.is_canceled()
    }
}
