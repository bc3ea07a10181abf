use async_nats::Client;
use base64::Engine;
use futures::stream::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{
    subjects, AudioFrameMessage, JoinMessage, LeaveMessage, MicrophoneStateMessage,
    TrackAnnouncement,
};
use super::{
    ConnectRequest, EventSender, MediaConfig, RealtimeConnection, RealtimeTransport, RemoteTrack,
    TrackKind, TransportEvent,
};
use crate::audio::{AudioCapture, AudioFrame, AudioSink};
use crate::error::TransportError;

/// Builds a fresh capture each time the microphone is enabled
pub type CaptureFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn AudioCapture>> + Send + Sync>;

const PUBLISHER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Realtime transport over the media router's NATS bus.
///
/// The credential endpoint is the NATS server and the access token is the NATS auth token.
/// Room signalling and PCM frames travel on the subjects in [`subjects`].
#[derive(Clone, Default)]
pub struct NatsTransport {
    capture_factory: Option<CaptureFactory>,
}

impl NatsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `factory` as the local microphone. Without one, enabling the microphone fails.
    pub fn with_capture(mut self, factory: CaptureFactory) -> Self {
        self.capture_factory = Some(factory);
        self
    }
}

#[async_trait::async_trait]
impl RealtimeTransport for NatsTransport {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: EventSender,
    ) -> Result<Arc<dyn RealtimeConnection>, TransportError> {
        let credential = request.credential;
        info!("Connecting to media router at {}", credential.endpoint);

        let callback_events = events.clone();
        let client = async_nats::ConnectOptions::with_token(credential.token.clone())
            .name(format!("mock-interview-{}", credential.identity))
            .event_callback(move |event| {
                let events = callback_events.clone();
                async move {
                    // Connected is reported once the room is joined, not per socket
                    match event {
                        async_nats::Event::Disconnected => {
                            let _ = events.send(TransportEvent::Disconnected {
                                reason: "lost connection to media router".to_string(),
                            });
                        }
                        other => debug!("NATS event: {:?}", other),
                    }
                }
            })
            .connect(credential.endpoint.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("Connected to media router successfully");

        let connection = Arc::new(NatsConnection {
            client: Mutex::new(Some(client)),
            room: credential.room,
            identity: credential.identity,
            capture_factory: self.capture_factory.clone(),
            microphone: Mutex::new(None),
            track_watcher: Mutex::new(None),
        });

        if let Err(e) = connection.join_room(events.clone(), &request.media).await {
            warn!("Failed to join room {}: {}", connection.room, e);
            connection.disconnect().await;
            return Err(e);
        }

        let _ = events.send(TransportEvent::Connected);

        Ok(connection)
    }
}

/// An open room on the NATS media router
pub struct NatsConnection {
    client: Mutex<Option<Client>>,
    room: String,
    identity: String,
    capture_factory: Option<CaptureFactory>,
    microphone: Mutex<Option<MicrophonePublisher>>,
    track_watcher: Mutex<Option<JoinHandle<()>>>,
}

impl NatsConnection {
    async fn current_client(&self) -> Result<Client, TransportError> {
        self.client.lock().await.clone().ok_or(TransportError::Closed)
    }

    async fn join_room(&self, events: EventSender, media: &MediaConfig) -> Result<(), TransportError> {
        self.watch_tracks(events).await?;
        self.announce_join(media).await
    }

    async fn announce_join(&self, media: &MediaConfig) -> Result<(), TransportError> {
        let client = self.current_client().await?;
        let message = JoinMessage {
            identity: self.identity.clone(),
            media: media.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        publish_json(&client, subjects::join(&self.room), &message).await
    }

    /// Turn track announcements from other participants into `TrackSubscribed` events
    async fn watch_tracks(&self, events: EventSender) -> Result<(), TransportError> {
        let client = self.current_client().await?;
        let subject = subjects::tracks(&self.room);

        info!("Subscribing to track announcements on {}", subject);

        let mut subscriber = client
            .subscribe(subject)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let room = self.room.clone();
        let identity = self.identity.clone();

        let task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<TrackAnnouncement>(&msg.payload) {
                    Ok(announcement) if announcement.participant == identity => continue,
                    Ok(announcement) => {
                        info!(
                            "Track {} ({:?}) published by {}",
                            announcement.track_sid, announcement.kind, announcement.participant
                        );
                        let track = NatsRemoteTrack::new(client.clone(), &room, announcement);
                        if events.send(TransportEvent::TrackSubscribed(Arc::new(track))).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse track announcement: {}", e);
                    }
                }
            }

            debug!("Track watcher stopped");
        });

        *self.track_watcher.lock().await = Some(task);

        Ok(())
    }

    /// Let other participants discover the microphone track
    async fn announce_track(&self, client: &Client) {
        let announcement = microphone_track(&self.identity);
        if let Err(e) = publish_json(client, subjects::tracks(&self.room), &announcement).await {
            warn!("Failed to announce microphone track: {}", e);
        }
    }

    async fn announce_microphone(&self, client: &Client, enabled: bool) {
        let message = MicrophoneStateMessage {
            identity: self.identity.clone(),
            enabled,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        if let Err(e) =
            publish_json(client, subjects::microphone(&self.room, &self.identity), &message).await
        {
            warn!("Failed to announce microphone state: {}", e);
        }
    }
}

#[async_trait::async_trait]
impl RealtimeConnection for NatsConnection {
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        let client = self.current_client().await?;

        let published = {
            let mut microphone = self.microphone.lock().await;

            if enabled && microphone.is_none() {
                let factory = self.capture_factory.as_ref().ok_or_else(|| {
                    TransportError::Microphone("no capture device configured".to_string())
                })?;

                let mut capture = factory().map_err(|e| TransportError::Microphone(format!("{:#}", e)))?;
                let frames = capture
                    .start()
                    .await
                    .map_err(|e| TransportError::Microphone(format!("{:#}", e)))?;

                info!("Publishing microphone from {} capture", capture.name());

                let task = tokio::spawn(publish_frames(
                    client.clone(),
                    self.room.clone(),
                    self.identity.clone(),
                    frames,
                ));
                *microphone = Some(MicrophonePublisher { capture, task });
                true
            } else {
                if !enabled {
                    if let Some(publisher) = microphone.take() {
                        publisher.stop().await;
                        info!("Microphone publishing stopped");
                    }
                }
                false
            }
        };

        if published {
            self.announce_track(&client).await;
        }
        self.announce_microphone(&client, enabled).await;

        Ok(())
    }

    async fn disconnect(&self) {
        let Some(client) = self.client.lock().await.take() else {
            debug!("Disconnect on closed connection ignored");
            return;
        };

        info!("Leaving room {}", self.room);

        if let Some(publisher) = self.microphone.lock().await.take() {
            publisher.stop().await;
        }

        if let Some(task) = self.track_watcher.lock().await.take() {
            task.abort();
        }

        let message = LeaveMessage {
            identity: self.identity.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = publish_json(&client, subjects::leave(&self.room), &message).await {
            warn!("Failed to announce leave: {}", e);
        }

        if let Err(e) = client.flush().await {
            warn!("Failed to flush NATS connection: {}", e);
        }

        // The connection closes when the last client handle is dropped
    }
}

impl Drop for NatsConnection {
    fn drop(&mut self) {
        // A connect future dropped mid-join never reaches disconnect()
        if let Some(task) = self.track_watcher.get_mut().take() {
            task.abort();
        }
        if let Some(publisher) = self.microphone.get_mut().take() {
            publisher.task.abort();
        }
    }
}

/// The microphone is published as a track named after the participant
fn microphone_track(identity: &str) -> TrackAnnouncement {
    TrackAnnouncement {
        track_sid: identity.to_string(),
        kind: TrackKind::Audio,
        participant: identity.to_string(),
    }
}

/// Local capture plus the task publishing its frames
struct MicrophonePublisher {
    capture: Box<dyn AudioCapture>,
    task: JoinHandle<()>,
}

impl MicrophonePublisher {
    async fn stop(mut self) {
        if let Err(e) = self.capture.stop().await {
            warn!("Failed to stop {} capture: {}", self.capture.name(), e);
        }

        // The publish task ends once the capture closes its channel
        if tokio::time::timeout(PUBLISHER_STOP_TIMEOUT, &mut self.task).await.is_err() {
            warn!("Microphone publisher did not stop in time, aborting");
            self.task.abort();
        }
    }
}

async fn publish_frames(
    client: Client,
    room: String,
    identity: String,
    mut frames: mpsc::Receiver<AudioFrame>,
) {
    let subject = subjects::audio(&room, &identity);
    let mut sequence: u32 = 0;
    let mut last_format = (48000, 1);

    debug!("Publishing microphone frames to {}", subject);

    while let Some(frame) = frames.recv().await {
        last_format = (frame.sample_rate, frame.channels);

        let message = frame_message(&room, &identity, sequence, &frame, false);
        if let Err(e) = publish_json(&client, subject.clone(), &message).await {
            error!("Failed to publish audio frame: {}", e);
            // Keep going; a dropped frame is not fatal
        }

        sequence = sequence.wrapping_add(1);
    }

    // Send final frame marker
    let marker = AudioFrame {
        samples: Vec::new(),
        sample_rate: last_format.0,
        channels: last_format.1,
        timestamp_ms: 0,
    };
    let message = frame_message(&room, &identity, sequence, &marker, true);
    if let Err(e) = publish_json(&client, subject, &message).await {
        error!("Failed to publish final frame marker: {}", e);
    }
}

fn frame_message(
    room: &str,
    identity: &str,
    sequence: u32,
    frame: &AudioFrame,
    final_frame: bool,
) -> AudioFrameMessage {
    AudioFrameMessage {
        room: room.to_string(),
        participant: identity.to_string(),
        sequence,
        pcm: base64::engine::general_purpose::STANDARD.encode(frame.to_pcm_bytes()),
        sample_rate: frame.sample_rate,
        channels: frame.channels,
        timestamp: chrono::Utc::now().to_rfc3339(),
        timestamp_ms: frame.timestamp_ms,
        final_frame,
    }
}

/// Decode a frame message. `None` marks the end of the stream.
pub fn decode_frame(payload: &[u8]) -> Result<Option<AudioFrame>, String> {
    let message: AudioFrameMessage =
        serde_json::from_slice(payload).map_err(|e| format!("invalid frame message: {}", e))?;

    if message.final_frame && message.pcm.is_empty() {
        return Ok(None);
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&message.pcm)
        .map_err(|e| format!("invalid PCM payload: {}", e))?;

    Ok(Some(AudioFrame::from_pcm_bytes(
        &bytes,
        message.sample_rate,
        message.channels,
        message.timestamp_ms,
    )))
}

async fn publish_json<T: Serialize>(
    client: &Client,
    subject: String,
    message: &T,
) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(message).map_err(|e| TransportError::Publish(e.to_string()))?;

    client
        .publish(subject, payload.into())
        .await
        .map_err(|e| TransportError::Publish(e.to_string()))
}

/// A remote track announced on the bus
pub struct NatsRemoteTrack {
    sid: String,
    kind: TrackKind,
    participant: String,
    subject: String,
    client: Client,
    forwarder: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl NatsRemoteTrack {
    fn new(client: Client, room: &str, announcement: TrackAnnouncement) -> Self {
        Self {
            subject: subjects::audio(room, &announcement.track_sid),
            sid: announcement.track_sid,
            kind: announcement.kind,
            participant: announcement.participant,
            client,
            forwarder: std::sync::Mutex::new(None),
        }
    }
}

impl fmt::Debug for NatsRemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsRemoteTrack")
            .field("sid", &self.sid)
            .field("kind", &self.kind)
            .field("participant", &self.participant)
            .finish()
    }
}

impl RemoteTrack for NatsRemoteTrack {
    fn sid(&self) -> &str {
        &self.sid
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn attach(&self, sink: Arc<dyn AudioSink>) -> Result<(), TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Attach(e.to_string()))?;

        let mut forwarder = self
            .forwarder
            .lock()
            .map_err(|_| TransportError::Attach("track lock poisoned".to_string()))?;

        if let Some(previous) = forwarder.take() {
            previous.abort();
        }

        let client = self.client.clone();
        let subject = self.subject.clone();
        let sid = self.sid.clone();

        *forwarder = Some(runtime.spawn(async move {
            let mut subscriber = match client.subscribe(subject.clone()).await {
                Ok(subscriber) => subscriber,
                Err(e) => {
                    error!("Failed to subscribe to {}: {}", subject, e);
                    return;
                }
            };

            info!("Track {} bound to {} sink", sid, sink.name());

            while let Some(msg) = subscriber.next().await {
                match decode_frame(&msg.payload) {
                    Ok(Some(frame)) => {
                        if let Err(e) = sink.write_frame(&frame) {
                            warn!("Failed to write remote audio: {}", e);
                        }
                    }
                    Ok(None) => {
                        debug!("Track {} ended", sid);
                        break;
                    }
                    Err(e) => warn!("Dropping frame on {}: {}", subject, e),
                }
            }
        }));

        Ok(())
    }

    fn detach(&self) {
        if let Ok(mut forwarder) = self.forwarder.lock() {
            if let Some(task) = forwarder.take() {
                task.abort();
            }
        }
    }
}

impl Drop for NatsRemoteTrack {
    fn drop(&mut self) {
        self.detach();
    }
}
