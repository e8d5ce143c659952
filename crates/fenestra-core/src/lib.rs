//! # fenestra-core
//!
//! Foundation types for the fenestra web-view coordination core.
//!
//! This crate provides the shared vocabulary the other fenestra crates depend
//! on:
//!
//! - **Branded IDs**: `NavigationId`, `CorrelationId`, `ChannelId`,
//!   `RpcCallId`, `SubscriptionId` as newtypes for type safety
//! - **Errors**: `WebViewError` hierarchy via `thiserror`, navigation error
//!   causes, RPC error values and reserved codes
//! - **Configuration**: explicit per-instance `WebViewConfig` / `BridgeConfig`
//! - **Wire envelopes**: the exact JSON-RPC 2.0 shapes crossing the bridge

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod ids;
pub mod wire;

pub use config::{BridgeConfig, RateLimit, WebViewConfig};
pub use error::{codes, NavigationError, NavigationErrorKind, RpcError, WebViewError};
pub use ids::{ChannelId, CorrelationId, NavigationId, RpcCallId, SubscriptionId};
