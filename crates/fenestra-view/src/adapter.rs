//! The seam between the coordination core and a platform web-view engine.
//!
//! The core never talks to an engine directly. Everything it asks of the
//! engine goes through [`NavigationAdapter`]; everything the engine observes
//! comes back as report values ([`NavigationStartReport`],
//! [`CompletionReport`]) handed to the core's adapter host. Reports carry
//! data only — the coordination verdicts are computed on the coordination
//! context and returned as [`StartDecision`] values.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use fenestra_core::{CorrelationId, NavigationError, NavigationId};

/// Failure reported by an engine adapter invocation.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct AdapterError {
    /// Human-readable detail from the engine.
    pub message: String,
}

impl AdapterError {
    /// Create an adapter error with the given detail.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The fallback request URI for content loads without a base.
pub(crate) fn about_blank() -> Url {
    Url::parse("about:blank").expect("static URL")
}

/// What a navigation loads.
#[derive(Clone, Debug)]
pub enum NavigationTarget {
    /// Load the resource at a URI.
    Uri(Url),
    /// Load a literal HTML string, optionally resolved against a base URI.
    Content {
        /// The HTML document body.
        html: String,
        /// Base URI for relative references; `about:blank` when absent.
        base: Option<Url>,
    },
}

impl NavigationTarget {
    /// The request URI tracked for this target.
    #[must_use]
    pub(crate) fn request_uri(&self) -> Url {
        match self {
            Self::Uri(uri) => uri.clone(),
            Self::Content { base, .. } => base.clone().unwrap_or_else(about_blank),
        }
    }
}

/// Commands the coordination core issues to the platform engine.
///
/// Invocations are made from the coordination context, one at a time. The
/// boolean-returning history commands report whether the engine accepted the
/// command; a rejected command resolves the tracked navigation as canceled
/// without an error.
#[async_trait]
pub trait NavigationAdapter: Send + Sync {
    /// Load the resource at `uri` under the given tracked navigation.
    async fn navigate(&self, navigation_id: &NavigationId, uri: &Url) -> Result<(), AdapterError>;

    /// Load a literal HTML string under the given tracked navigation.
    async fn navigate_to_content(
        &self,
        navigation_id: &NavigationId,
        html: &str,
        base_uri: &Url,
    ) -> Result<(), AdapterError>;

    /// Whether the engine currently has back history.
    fn can_go_back(&self) -> bool;

    /// Whether the engine currently has forward history.
    fn can_go_forward(&self) -> bool;

    /// Go back one history entry. `Ok(false)` means the engine declined.
    async fn go_back(&self, navigation_id: &NavigationId) -> Result<bool, AdapterError>;

    /// Go forward one history entry. `Ok(false)` means the engine declined.
    async fn go_forward(&self, navigation_id: &NavigationId) -> Result<bool, AdapterError>;

    /// Reload the current document. `Ok(false)` means the engine declined.
    async fn refresh(&self, navigation_id: &NavigationId) -> Result<bool, AdapterError>;

    /// Abort whatever the engine is currently loading.
    async fn stop(&self);

    /// Evaluate a script in the page, returning its serialized result if any.
    async fn run_script(&self, script: &str) -> Result<Option<String>, AdapterError>;

    /// The engine's current zoom factor.
    fn zoom(&self) -> f64;

    /// Apply a zoom factor. Callers clamp to the engine range before this
    /// is invoked.
    async fn set_zoom(&self, factor: f64) -> Result<(), AdapterError>;
}

/// An engine-observed navigation start, reported before the engine commits.
///
/// The engine does not know about tracked navigation identities; it reports
/// under its own correlation ID, and the core maps that onto the active
/// operation (reuse, redirect retarget, or supersession).
#[derive(Clone, Debug)]
pub struct NavigationStartReport {
    /// The engine's correlation for this navigation action. Redirect hops
    /// share the correlation of the action that caused them.
    pub correlation_id: CorrelationId,
    /// Where the engine is about to go.
    pub uri: Url,
    /// Whether this is the top-level frame. Subframe loads are never tracked.
    pub is_main_frame: bool,
}

/// Verdict returned to the engine for a reported navigation start.
#[derive(Clone, Debug)]
pub struct StartDecision {
    /// Whether the engine may proceed.
    pub allow: bool,
    /// The tracked navigation this start was mapped onto, when the load is
    /// allowed and main-frame.
    pub navigation_id: Option<NavigationId>,
}

impl StartDecision {
    /// Allow the load, optionally attaching it to a tracked navigation.
    #[must_use]
    pub fn allow(navigation_id: Option<NavigationId>) -> Self {
        Self {
            allow: true,
            navigation_id,
        }
    }

    /// Refuse the load.
    #[must_use]
    pub fn deny() -> Self {
        Self {
            allow: false,
            navigation_id: None,
        }
    }
}

/// How an engine-reported navigation ended.
#[derive(Clone, Debug)]
pub enum CompletionDisposition {
    /// The document loaded.
    Success,
    /// The engine abandoned the load.
    Canceled,
    /// The load failed, with a categorized cause when the engine has one.
    Failure(Option<NavigationError>),
}

/// Terminal report for a tracked navigation.
///
/// Reports whose `navigation_id` does not match the active operation are
/// dropped; the engine may emit completions for loads the core has already
/// superseded or resolved.
#[derive(Clone, Debug)]
pub struct CompletionReport {
    /// The tracked navigation this report is for.
    pub navigation_id: NavigationId,
    /// The final URI, after any redirects.
    pub uri: Url,
    /// How the navigation ended.
    pub disposition: CompletionDisposition,
}
