//! The message-delivery seam between the core and the embedder.
//!
//! The bridge never owns a socket. Each direction is a fire-and-forget
//! "deliver opaque text" primitive: outbound through [`MessageTransport`],
//! inbound as [`InboundMessage`] values handed to the view by the platform
//! adapter.

use fenestra_core::ChannelId;

/// Outbound delivery primitive implemented by the embedder.
///
/// Delivery is fire-and-forget: the transport reports nothing back, and the
/// bridge correlates replies purely by envelope id.
pub trait MessageTransport: Send + Sync {
    /// Deliver one opaque text payload to the peer.
    fn deliver(&self, text: &str);
}

/// One inbound message as reported by the platform adapter, carrying the
/// attribution the policy gate evaluates before anything else sees the body.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Opaque message body (possibly, but not necessarily, an RPC envelope).
    pub body: String,
    /// Declared origin of the sending document.
    pub origin: String,
    /// Channel the sender believes it is attached to.
    pub channel_id: ChannelId,
    /// Bridge protocol version the sender speaks.
    pub protocol_version: u32,
}
