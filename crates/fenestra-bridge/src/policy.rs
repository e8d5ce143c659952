//! Inbound-message policy gate.
//!
//! Evaluated before anything else sees a message. Decisions are values,
//! never errors; denials are reported only to an optional diagnostics sink
//! and never reach application subscribers.

use std::collections::HashSet;

use fenestra_core::{BridgeConfig, ChannelId};

use crate::transport::InboundMessage;

/// Why an inbound message was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The allow-set is non-empty and does not contain the declared origin.
    OriginNotAllowed,
    /// The sender speaks a different bridge protocol version.
    ProtocolMismatch,
    /// The message was addressed to a different view instance's channel.
    ChannelMismatch,
}

/// Outcome of policy evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The message may proceed to the RPC transport / subscribers.
    Allow,
    /// The message is dropped with the given reason.
    Deny(DropReason),
}

/// Details handed to the diagnostics sink when a message is dropped.
#[derive(Clone, Debug)]
pub struct DropDiagnostic {
    /// Why the message was dropped.
    pub reason: DropReason,
    /// Declared origin of the dropped message.
    pub origin: String,
    /// Channel the dropped message was addressed to.
    pub channel_id: ChannelId,
}

/// Optional sink for dropped-message diagnostics.
pub trait DropDiagnosticsSink: Send + Sync {
    /// Called once per denied message with the specific reason.
    fn message_dropped(&self, diagnostic: &DropDiagnostic);
}

/// Origin / protocol-version / channel filter for one view instance.
#[derive(Clone, Debug)]
pub struct MessagePolicy {
    allowed_origins: HashSet<String>,
    protocol_version: u32,
    channel_id: ChannelId,
}

impl MessagePolicy {
    /// Build the policy for one view instance from its bridge configuration.
    #[must_use]
    pub fn new(config: &BridgeConfig, channel_id: ChannelId) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            protocol_version: config.protocol_version,
            channel_id,
        }
    }

    /// Evaluate an inbound message. Never fails; always returns a decision.
    #[must_use]
    pub fn evaluate(&self, message: &InboundMessage) -> PolicyDecision {
        if !self.allowed_origins.is_empty() && !self.allowed_origins.contains(&message.origin) {
            return PolicyDecision::Deny(DropReason::OriginNotAllowed);
        }

        if message.protocol_version != self.protocol_version {
            return PolicyDecision::Deny(DropReason::ProtocolMismatch);
        }

        if message.channel_id != self.channel_id {
            return PolicyDecision::Deny(DropReason::ChannelMismatch);
        }

        PolicyDecision::Allow
    }
}
