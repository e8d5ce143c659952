//! Error taxonomy for the coordination core.
//!
//! Three layers, mirroring the boundaries they cross:
//!
//! - [`WebViewError`] — coordination/queue-level categories attached to every
//!   queued operation result. A failure is tagged with a category exactly
//!   once; an error already carrying a category passes through unchanged.
//! - [`NavigationError`] — navigation-specific causes reported by the engine
//!   adapter (network, SSL, timeout) or synthesized by the core.
//! - [`RpcError`] — a code + message **value** crossing the bridge wire. It is
//!   only converted into [`WebViewError::Rpc`] once fully inside the host
//!   call stack; on the wire it is never an exception.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::ids::NavigationId;

/// Reserved JSON-RPC error codes used by the bridge.
pub mod codes {
    /// No handler is registered under the requested method name.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// A handler failed with an undeclared error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A host-initiated call did not receive a response before its deadline.
    pub const CALL_TIMEOUT: i64 = -32000;
    /// A rate-limited method exceeded its sliding-window call budget.
    pub const RATE_LIMIT_EXCEEDED: i64 = -32029;
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordination-level errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure category attached to a queued operation's result.
#[derive(Clone, Debug, Error)]
pub enum WebViewError {
    /// The view has been torn down; all subsequent operations are rejected.
    #[error("web view has been disposed")]
    Disposed,

    /// The view's lifecycle phase forbids new operations (e.g. mid-teardown).
    #[error("web view is not ready: {0}")]
    NotReady(String),

    /// Marshaling onto the coordination context failed, or a context-only API
    /// was used from the wrong place.
    #[error("dispatch to coordination context failed: {0}")]
    DispatchFailed(String),

    /// The engine adapter rejected or failed an invocation.
    #[error("adapter call failed: {0}")]
    AdapterFailed(String),

    /// A navigation resolved with a failure cause.
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    /// A bridge call resolved with a peer-reported error.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl WebViewError {
    /// Dispatch failure with context.
    #[must_use]
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::DispatchFailed(message.into())
    }

    /// Adapter failure with context.
    #[must_use]
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::AdapterFailed(message.into())
    }

    /// Lifecycle-phase rejection with context.
    #[must_use]
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady(message.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation errors
// ─────────────────────────────────────────────────────────────────────────────

/// Cause category for a failed navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationErrorKind {
    /// DNS, connection, or other transport-level failure.
    Network,
    /// Certificate or TLS handshake failure.
    Ssl,
    /// The engine gave up waiting for the resource.
    Timeout,
    /// The view was disposed while the navigation was in flight.
    Disposed,
    /// The engine reported failure without a categorized cause.
    Other,
}

/// A categorized navigation failure.
///
/// Adapter reports carrying a categorized cause (network / SSL / timeout)
/// pass through unmodified; a bare failure report gets a synthesized
/// [`NavigationErrorKind::Other`] cause.
#[derive(Clone, Debug, Error)]
#[error("navigation {navigation_id} to {uri} failed: {message}")]
pub struct NavigationError {
    /// Cause category.
    pub kind: NavigationErrorKind,
    /// The operation that failed.
    pub navigation_id: NavigationId,
    /// The request URI at the time of failure.
    pub uri: Url,
    /// Human-readable detail.
    pub message: String,
}

impl NavigationError {
    /// Create a categorized navigation error.
    #[must_use]
    pub fn new(
        kind: NavigationErrorKind,
        navigation_id: NavigationId,
        uri: Url,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            navigation_id,
            uri,
            message: message.into(),
        }
    }

    /// Synthesized cause for a failure the adapter reported without one.
    #[must_use]
    pub fn generic(navigation_id: NavigationId, uri: Url) -> Self {
        Self::new(
            NavigationErrorKind::Other,
            navigation_id,
            uri,
            "Navigation failed.",
        )
    }

    /// Disposed-category fault for a navigation interrupted by teardown.
    #[must_use]
    pub fn disposed(navigation_id: NavigationId, uri: Url) -> Self {
        Self::new(
            NavigationErrorKind::Disposed,
            navigation_id,
            uri,
            "The web view was disposed before the navigation completed.",
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RPC errors
// ─────────────────────────────────────────────────────────────────────────────

/// A code + message value crossing the bridge wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    /// JSON-RPC error code. Negative values in the `-32xxx` range are
    /// reserved; see [`codes`].
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl RpcError {
    /// Create an RPC error value.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// No handler registered under the method name.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    /// Undeclared handler failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    /// Host-call deadline elapsed before the peer replied.
    #[must_use]
    pub fn timeout(method: &str) -> Self {
        Self::new(codes::CALL_TIMEOUT, format!("RPC call '{method}' timed out."))
    }

    /// Sliding-window budget exhausted.
    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(codes::RATE_LIMIT_EXCEEDED, "Rate limit exceeded")
    }
}
