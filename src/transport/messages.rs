use serde::{Deserialize, Serialize};

use super::{MediaConfig, TrackKind};

/// Subjects used on the media router's message bus
pub mod subjects {
    pub fn join(room: &str) -> String {
        format!("room.{}.join", room)
    }

    pub fn leave(room: &str) -> String {
        format!("room.{}.leave", room)
    }

    pub fn tracks(room: &str) -> String {
        format!("room.{}.tracks", room)
    }

    pub fn audio(room: &str, track_sid: &str) -> String {
        format!("room.{}.audio.{}", room, track_sid)
    }

    pub fn microphone(room: &str, identity: &str) -> String {
        format!("room.{}.participants.{}.microphone", room, identity)
    }
}

/// Audio frame message exchanged with the media router
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub room: String,
    pub participant: String,
    pub sequence: u32,
    pub pcm: String,  // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String,  // RFC3339 timestamp
    #[serde(default)]
    pub timestamp_ms: u64,
    #[serde(rename = "final", default)]
    pub final_frame: bool,
}

/// A participant published a track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackAnnouncement {
    pub track_sid: String,
    pub kind: TrackKind,
    pub participant: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinMessage {
    pub identity: String,
    pub media: MediaConfig,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveMessage {
    pub identity: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MicrophoneStateMessage {
    pub identity: String,
    pub enabled: bool,
    pub timestamp: String,
}
