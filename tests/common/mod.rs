// Scripted collaborators for driving the session controller in tests
#![allow(dead_code)]

use anyhow::Result;
use mock_interview::audio::{AudioFrame, AudioSink};
use mock_interview::credentials::{CredentialProvider, CredentialRequest, JoinGrant};
use mock_interview::error::{CredentialError, TransportError};
use mock_interview::ingestion::{JobListing, ResumeText};
use mock_interview::session::{
    ConnectionState, SessionConfig, SessionController, SessionSnapshot, Transition,
};
use mock_interview::transport::{
    ConnectRequest, RealtimeConnection, RealtimeTransport, RemoteTrack, TrackKind, TransportEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn job() -> JobListing {
    JobListing::from_value(serde_json::json!({ "title": "SWE" })).expect("object")
}

pub fn resume() -> ResumeText {
    ResumeText::new("resume text")
}

pub fn grant() -> JoinGrant {
    JoinGrant {
        url: Some("wss://x".to_string()),
        token: Some("t".to_string()),
        identity: None,
    }
}

/// Wait until the published snapshot satisfies `predicate`
pub async fn wait_until(
    controller: &SessionController,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = controller.subscribe();
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("controller stopped")
        .clone();
    snapshot
}

/// Drain every transition received so far
pub fn drain_transitions(
    rx: &mut tokio::sync::broadcast::Receiver<Transition>,
) -> Vec<(ConnectionState, ConnectionState)> {
    let mut seen = Vec::new();
    while let Ok(t) = rx.try_recv() {
        seen.push((t.from, t.to));
    }
    seen
}

/// Let queued completions drain
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// ----------------------------------------------------------------------------
// Credentials
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub enum CredentialBehavior {
    Grant(JoinGrant),
    Status(u16),
    Malformed,
    /// Wait for `release_credential` before granting
    Hold(JoinGrant),
}

pub struct FakeCredentials {
    behavior: CredentialBehavior,
    release: Notify,
    pub requests: Mutex<Vec<CredentialRequest>>,
}

impl FakeCredentials {
    pub fn new(behavior: CredentialBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            release: Notify::new(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn granting() -> Arc<Self> {
        Self::new(CredentialBehavior::Grant(grant()))
    }

    pub fn release_credential(&self) {
        self.release.notify_one();
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CredentialProvider for FakeCredentials {
    async fn request_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<JoinGrant, CredentialError> {
        self.requests.lock().unwrap().push(request.clone());

        match &self.behavior {
            CredentialBehavior::Grant(grant) => Ok(grant.clone()),
            CredentialBehavior::Status(status) => Err(CredentialError::Status {
                status: *status,
                message: "Internal Server Error".to_string(),
            }),
            CredentialBehavior::Malformed => {
                Err(CredentialError::Malformed("expected value at line 1".to_string()))
            }
            CredentialBehavior::Hold(grant) => {
                self.release.notified().await;
                Ok(grant.clone())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Notify Connected, then return the connection
    Immediate,
    /// Return the connection without a Connected notification
    Silent,
    /// Return the connection only after `release_connect`, notifying Connected first
    Hold,
    /// Fail the attempt
    Fail,
    /// Never complete
    Hang,
}

pub struct FakeTransport {
    behavior: ConnectBehavior,
    microphone_fails: bool,
    enable_delay: Duration,
    release: Notify,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    pub requests: Mutex<Vec<ConnectRequest>>,
    pub connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeTransport {
    pub fn new(behavior: ConnectBehavior) -> Arc<Self> {
        Self::build(behavior, false, Duration::ZERO)
    }

    pub fn with_broken_microphone(behavior: ConnectBehavior) -> Arc<Self> {
        Self::build(behavior, true, Duration::ZERO)
    }

    /// Enabling the microphone takes `delay`; disabling is instant
    pub fn with_slow_microphone(behavior: ConnectBehavior, delay: Duration) -> Arc<Self> {
        Self::build(behavior, false, delay)
    }

    fn build(behavior: ConnectBehavior, microphone_fails: bool, enable_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            microphone_fails,
            enable_delay,
            release: Notify::new(),
            events: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn release_connect(&self) {
        self.release.notify_one();
    }

    /// Push a notification as if the transport emitted it
    pub fn emit(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }

    pub fn connect_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        Arc::clone(&self.connections.lock().unwrap()[index])
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    fn open(&self) -> Result<Arc<dyn RealtimeConnection>, TransportError> {
        let connection = Arc::new(FakeConnection::new(self.microphone_fails, self.enable_delay));
        self.connections.lock().unwrap().push(Arc::clone(&connection));
        let connection: Arc<dyn RealtimeConnection> = connection;
        Ok(connection)
    }
}

#[async_trait::async_trait]
impl RealtimeTransport for FakeTransport {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn RealtimeConnection>, TransportError> {
        *self.events.lock().unwrap() = Some(events.clone());
        self.requests.lock().unwrap().push(request);

        match self.behavior {
            ConnectBehavior::Immediate => {
                let _ = events.send(TransportEvent::Connected);
                self.open()
            }
            ConnectBehavior::Silent => self.open(),
            ConnectBehavior::Hold => {
                self.release.notified().await;
                let _ = events.send(TransportEvent::Connected);
                self.open()
            }
            ConnectBehavior::Fail => Err(TransportError::Connect("router unreachable".to_string())),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }
}

pub struct FakeConnection {
    microphone_fails: bool,
    enable_delay: Duration,
    pub fail_mute: AtomicBool,
    pub microphone_calls: Mutex<Vec<bool>>,
    device_enabled: AtomicBool,
    disconnects: AtomicUsize,
}

impl FakeConnection {
    fn new(microphone_fails: bool, enable_delay: Duration) -> Self {
        Self {
            microphone_fails,
            enable_delay,
            fail_mute: AtomicBool::new(false),
            microphone_calls: Mutex::new(Vec::new()),
            device_enabled: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Whether the last completed device operation left the microphone live
    pub fn device_enabled(&self) -> bool {
        self.device_enabled.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn microphone_calls(&self) -> Vec<bool> {
        self.microphone_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RealtimeConnection for FakeConnection {
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        let first = {
            let mut calls = self.microphone_calls.lock().unwrap();
            calls.push(enabled);
            calls.len() == 1
        };

        if first && self.microphone_fails {
            return Err(TransportError::Microphone("permission denied".to_string()));
        }
        if !first && self.fail_mute.load(Ordering::SeqCst) {
            return Err(TransportError::Microphone("device busy".to_string()));
        }

        if enabled && !self.enable_delay.is_zero() {
            tokio::time::sleep(self.enable_delay).await;
        }
        self.device_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct FakeTrack {
    sid: String,
    kind: TrackKind,
    attached: AtomicBool,
    detaches: AtomicUsize,
}

impl FakeTrack {
    pub fn audio(sid: &str) -> Arc<Self> {
        Self::new(sid, TrackKind::Audio)
    }

    pub fn new(sid: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            sid: sid.to_string(),
            kind,
            attached: AtomicBool::new(false),
            detaches: AtomicUsize::new(0),
        })
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl RemoteTrack for FakeTrack {
    fn sid(&self) -> &str {
        &self.sid
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn attach(&self, _sink: Arc<dyn AudioSink>) -> Result<(), TransportError> {
        self.attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Sink
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct CountingSink {
    pub frames: AtomicUsize,
    pub finishes: AtomicUsize,
}

impl CountingSink {
    pub fn finish_count(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }
}

impl AudioSink for CountingSink {
    fn write_frame(&self, _frame: &AudioFrame) -> Result<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

pub struct Harness {
    pub controller: SessionController,
    pub credentials: Arc<FakeCredentials>,
    pub transport: Arc<FakeTransport>,
    pub sink: Arc<CountingSink>,
}

impl Harness {
    pub fn new(credentials: Arc<FakeCredentials>, transport: Arc<FakeTransport>) -> Self {
        Self::with_config(SessionConfig::default(), credentials, transport)
    }

    pub fn with_config(
        config: SessionConfig,
        credentials: Arc<FakeCredentials>,
        transport: Arc<FakeTransport>,
    ) -> Self {
        let sink = Arc::new(CountingSink::default());
        let controller = SessionController::spawn(
            config,
            credentials.clone(),
            transport.clone(),
            sink.clone(),
        );

        Self {
            controller,
            credentials,
            transport,
            sink,
        }
    }

    pub async fn start(&self) -> SessionSnapshot {
        self.controller
            .start(Some(job()), Some(resume()))
            .await
            .expect("start accepted")
    }
}
