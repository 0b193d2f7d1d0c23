//! Sidechannel transport capability (§6).
//!
//! The core never talks to a pub/sub bus directly; it talks to whatever
//! implements [`Sidechannel`]. No concrete transport ships here — this
//! crate only defines the trait and the message shape the orchestrators
//! consume, per §1's "sidechannel transport is an external collaborator".

use async_trait::async_trait;
use serde_json::Value;
use swap_types::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("sidechannel transport failed: {0}")]
    Failed(String),
}

/// An inbound message from the sidechannel: which channel it arrived on,
/// and the envelope it carried. Messages are untrusted — callers must run
/// them through `swap_types::schema::validate` before any use (§6).
#[derive(Debug, Clone)]
pub struct SidechannelMessage {
    pub channel: String,
    pub envelope: Envelope,
}

#[async_trait]
pub trait Sidechannel: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;

    /// Joins `channel`, optionally presenting an invite capability and/or
    /// accepting a welcome capability issued by the channel's owner.
    async fn join(&self, channel: &str, invite: Option<Value>, welcome: Option<Value>) -> Result<(), TransportError>;
    async fn leave(&self, channel: &str) -> Result<(), TransportError>;
    async fn subscribe(&self, channels: &[String]) -> Result<(), TransportError>;

    /// Fire-and-forget send (§6: "fire-and-forget semantics at this
    /// layer" — delivery is not guaranteed, liveness comes from the
    /// orchestrator's resender).
    async fn send(&self, channel: &str, envelope: Envelope) -> Result<(), TransportError>;

    /// Waits for the next inbound message. Returns `None` once the
    /// transport has been closed and will not yield any more messages.
    async fn recv(&self) -> Option<SidechannelMessage>;
}
