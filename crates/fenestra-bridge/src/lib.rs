//! # fenestra-bridge
//!
//! Bidirectional JSON-RPC 2.0 bridge over a one-way message-delivery
//! primitive, plus the policy layers that guard it.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `transport` | The `deliver(text)` seam and inbound message value |
//! | `rpc` | Pending-call correlation, timeout, handler registry, dispatch |
//! | `policy` | Origin / protocol-version / channel gate for inbound messages |
//! | `rate_limit` | Sliding-window call budgets wrapped around handlers |
//! | `service` | Named service exposure: method tables built at registration |
//!
//! Inbound flow: policy gate → RPC classification (response correlation or
//! request dispatch) → registered handlers. Outbound flow: `invoke` mints an
//! id, registers a pending call, delivers, and awaits the correlated reply
//! under a deadline.

#![deny(unsafe_code)]

pub mod policy;
pub mod rate_limit;
pub mod rpc;
pub mod service;
pub mod transport;

pub use policy::{DropDiagnostic, DropDiagnosticsSink, DropReason, MessagePolicy, PolicyDecision};
pub use rate_limit::{RateLimitWindow, RateLimited};
pub use rpc::{HandlerRegistry, MethodHandler, RpcService, SyncFn};
pub use service::{BridgeService, ServiceMethods};
pub use transport::{InboundMessage, MessageTransport};
