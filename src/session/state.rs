use serde::{Deserialize, Serialize};

use crate::error::SessionErrorKind;

/// Coarse connection state, without per-state data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    AcquiringCredential,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// Whether `self -> next` is an edge of the session state machine
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Idle, AcquiringCredential)
                | (AcquiringCredential, Connecting)
                | (AcquiringCredential, Failed)
                | (AcquiringCredential, Disconnecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connecting, Disconnecting)
                | (Connecting, Disconnected)
                | (Connected, Connected)
                | (Connected, Disconnecting)
                | (Connected, Disconnected)
                | (Disconnecting, Disconnected)
                | (Failed, Idle)
                | (Disconnected, Idle)
        )
    }

    /// A session exists and owns resources
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::AcquiringCredential
                | ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Disconnecting
        )
    }
}

/// One applied change of [`ConnectionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Session state as observed by the presentation layer.
///
/// Microphone and remote-audio flags only exist while connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AcquiringCredential {
        room: String,
    },
    Connecting {
        room: String,
    },
    Connected {
        room: String,
        microphone_muted: bool,
        remote_audio_bound: bool,
    },
    Disconnecting {
        room: String,
    },
    Disconnected,
    Failed,
}

impl SessionState {
    pub fn connection_state(&self) -> ConnectionState {
        match self {
            SessionState::Idle => ConnectionState::Idle,
            SessionState::AcquiringCredential { .. } => ConnectionState::AcquiringCredential,
            SessionState::Connecting { .. } => ConnectionState::Connecting,
            SessionState::Connected { .. } => ConnectionState::Connected,
            SessionState::Disconnecting { .. } => ConnectionState::Disconnecting,
            SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Failed => ConnectionState::Failed,
        }
    }

    pub fn room(&self) -> Option<&str> {
        match self {
            SessionState::AcquiringCredential { room }
            | SessionState::Connecting { room }
            | SessionState::Connected { room, .. }
            | SessionState::Disconnecting { room } => Some(room),
            SessionState::Idle | SessionState::Disconnected | SessionState::Failed => None,
        }
    }

    /// `None` outside Connected
    pub fn microphone_muted(&self) -> Option<bool> {
        match self {
            SessionState::Connected { microphone_muted, .. } => Some(*microphone_muted),
            _ => None,
        }
    }

    /// Always false outside Connected
    pub fn remote_audio_bound(&self) -> bool {
        matches!(
            self,
            SessionState::Connected {
                remote_audio_bound: true,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl LastError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub state: SessionState,
    pub last_error: Option<LastError>,
}

impl SessionSnapshot {
    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection_state()
    }

    pub fn microphone_muted(&self) -> Option<bool> {
        self.state.microphone_muted()
    }

    pub fn remote_audio_bound(&self) -> bool {
        self.state.remote_audio_bound()
    }

    pub fn last_error_kind(&self) -> Option<SessionErrorKind> {
        self.last_error.as_ref().map(|e| e.kind)
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            last_error: None,
        }
    }
}
