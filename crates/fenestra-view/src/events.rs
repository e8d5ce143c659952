//! Event values and the token-keyed subscriber lists.
//!
//! All delivery happens on the coordination context, in subscription order.
//! Subscribers are owned closures keyed by [`SubscriptionId`] tokens, so
//! removal never depends on closure identity. The teardown check happens
//! immediately before each delivery, not merely at enqueue time.

use url::Url;

use fenestra_core::{NavigationError, NavigationId, SubscriptionId};

use crate::navigation::NavigationStatus;

/// Permission categories a page can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PermissionKind {
    Camera,
    Microphone,
    Geolocation,
    Notifications,
    ClipboardRead,
    Other,
}

/// Events delivered to subscribers on the coordination context.
#[derive(Clone, Debug)]
pub enum WebViewEvent {
    /// A tracked navigation began (or retargeted onto a new URI).
    NavigationStarted {
        /// The tracked navigation.
        navigation_id: NavigationId,
        /// The request URI at start time.
        uri: Url,
    },
    /// A tracked navigation reached a terminal state.
    NavigationCompleted {
        /// The tracked navigation.
        navigation_id: NavigationId,
        /// The request URI at completion time.
        uri: Url,
        /// Terminal status, or the categorized failure cause.
        result: Result<NavigationStatus, NavigationError>,
    },
    /// The page asked for a new top-level window.
    NewWindowRequested {
        /// The URI the page wants opened.
        uri: Url,
    },
    /// A policy-allowed inbound message that was not an RPC envelope.
    MessageReceived {
        /// The opaque message body.
        body: String,
        /// Declared origin of the sending document.
        origin: String,
    },
    /// The engine began a file download.
    DownloadRequested {
        /// Source of the download.
        uri: Url,
        /// Engine-suggested file name.
        suggested_filename: String,
    },
    /// The page requested a permission.
    PermissionRequested {
        /// What was requested.
        kind: PermissionKind,
        /// Origin of the requesting document.
        origin: String,
    },
    /// The engine's zoom factor changed.
    ZoomChanged {
        /// The new zoom factor.
        factor: f64,
    },
    /// The engine is fetching a sub-resource.
    ResourceRequested {
        /// The resource URI.
        uri: Url,
    },
    /// The engine environment finished initializing.
    EnvironmentReady,
}

/// A cancelable view of a navigation that is about to start.
///
/// Handed to starting interceptors before the engine (or adapter) is asked
/// to load anything. Canceling resolves the navigation with
/// [`NavigationStatus::Canceled`].
#[derive(Debug)]
pub struct NavigationStarting {
    /// The tracked navigation about to start.
    pub navigation_id: NavigationId,
    /// Where it is going.
    pub uri: Url,
    canceled: bool,
}

impl NavigationStarting {
    pub(crate) fn new(navigation_id: NavigationId, uri: Url) -> Self {
        Self {
            navigation_id,
            uri,
            canceled: false,
        }
    }

    /// Cancel this navigation before it starts.
    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    /// Whether any interceptor has canceled this navigation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }
}

pub(crate) type EventSubscriber = Box<dyn Fn(&WebViewEvent) + Send>;
pub(crate) type StartingInterceptor = Box<dyn FnMut(&mut NavigationStarting) + Send>;

/// Token-keyed subscriber lists, owned by the coordination context.
#[derive(Default)]
pub(crate) struct Subscribers {
    events: Vec<(SubscriptionId, EventSubscriber)>,
    starting: Vec<(SubscriptionId, StartingInterceptor)>,
}

impl Subscribers {
    pub(crate) fn add_event(&mut self, subscriber: EventSubscriber) -> SubscriptionId {
        let token = SubscriptionId::new();
        self.events.push((token.clone(), subscriber));
        token
    }

    pub(crate) fn add_starting(&mut self, interceptor: StartingInterceptor) -> SubscriptionId {
        let token = SubscriptionId::new();
        self.starting.push((token.clone(), interceptor));
        token
    }

    /// Remove whichever list holds the token. Idempotent.
    pub(crate) fn remove(&mut self, token: &SubscriptionId) {
        self.events.retain(|(t, _)| t != token);
        self.starting.retain(|(t, _)| t != token);
    }

    /// Deliver one event to every subscriber, in subscription order.
    pub(crate) fn deliver(&self, event: &WebViewEvent) {
        for (_, subscriber) in &self.events {
            subscriber(event);
        }
    }

    /// Run every starting interceptor, in subscription order.
    pub(crate) fn intercept(&mut self, starting: &mut NavigationStarting) {
        for (_, interceptor) in &mut self.starting {
            interceptor(starting);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
        self.starting.clear();
    }
}
