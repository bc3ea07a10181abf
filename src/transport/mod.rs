//! Realtime media transport
//!
//! The session controller only sees these traits:
//! - [`RealtimeTransport`] opens a connection for a credential
//! - [`RealtimeConnection`] toggles the local microphone and disconnects
//! - [`RemoteTrack`] is a subscribed remote stream that can be bound to an [`AudioSink`]
//!
//! Lifecycle notifications arrive as [`TransportEvent`]s on the channel handed to `connect`.
//! [`NatsTransport`] is the implementation used by the binary.

pub mod messages;
pub mod nats;

pub use nats::{CaptureFactory, NatsTransport};

use crate::audio::AudioSink;
use crate::credentials::SessionCredential;
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Voice-call media settings requested from the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Let the router adapt stream quality to the subscriber
    pub adaptive_stream: bool,
    /// Pause publishing layers nobody subscribes to
    pub dynacast: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            adaptive_stream: true,
            dynacast: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
    Data,
}

/// A remote participant's subscribed track
pub trait RemoteTrack: Send + Sync + fmt::Debug {
    fn sid(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Start delivering this track's audio into `sink`
    fn attach(&self, sink: Arc<dyn AudioSink>) -> Result<(), TransportError>;

    /// Stop delivering audio. Safe to call when not attached.
    fn detach(&self);
}

/// Connection lifecycle notifications
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    TrackSubscribed(Arc<dyn RemoteTrack>),
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Everything needed to join a room
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub credential: SessionCredential,
    pub media: MediaConfig,
}

#[async_trait::async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Join the room described by `request`.
    ///
    /// `events` is live before the connection attempt starts; implementations may emit
    /// notifications on it before this future resolves.
    async fn connect(
        &self,
        request: ConnectRequest,
        events: EventSender,
    ) -> Result<Arc<dyn RealtimeConnection>, TransportError>;
}

#[async_trait::async_trait]
pub trait RealtimeConnection: Send + Sync {
    /// Enable or disable publishing of the local microphone.
    ///
    /// Resolves once the device has actually changed state.
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError>;

    /// Leave the room and release local media. Idempotent.
    async fn disconnect(&self);
}
