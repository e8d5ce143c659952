//! # fenestra-view
//!
//! The coordination core for one embedded web-view surface.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `view` | The public `WebView` handle and the on-context `DirectView` |
//! | `context` | The actor task owning all mutable state; the adapter host |
//! | `navigation` | The at-most-one-active navigation state machine |
//! | `events` | Event values, subscriber tokens, starting interceptors |
//! | `adapter` | The engine seam: commands out, reports in |
//!
//! All state mutation happens on a single coordination task. Handles submit
//! operations into its FIFO queue; the platform adapter reports engine
//! activity into the same queue, so every observer sees one total order of
//! navigations, events, and bridge traffic.

#![deny(unsafe_code)]

pub mod adapter;
pub mod context;
pub mod events;
pub mod navigation;
pub mod view;

pub use adapter::{
    AdapterError, CompletionDisposition, CompletionReport, NavigationAdapter,
    NavigationStartReport, NavigationTarget, StartDecision,
};
pub use context::AdapterHost;
pub use events::{NavigationStarting, PermissionKind, WebViewEvent};
pub use navigation::NavigationStatus;
pub use view::{DirectView, WebView, ZOOM_MAX, ZOOM_MIN};
