use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::{ConnectionState, LastError, SessionSnapshot, SessionState, Transition};
use super::stats::{SessionHistory, SessionOutcome, UNKNOWN_ROLE};
use crate::audio::AudioSink;
use crate::credentials::{CredentialProvider, CredentialRequest, JoinGrant, SessionCredential};
use crate::error::{CredentialError, SessionError, SessionErrorKind, TransportError};
use crate::ingestion::{JobListing, ResumeText};
use crate::transport::{
    ConnectRequest, RealtimeConnection, RealtimeTransport, RemoteTrack, TrackKind, TransportEvent,
};

const COMMAND_BUFFER: usize = 32;
const TRANSITION_BUFFER: usize = 64;

/// How long teardown waits for an in-flight microphone operation
const MICROPHONE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type Reply = oneshot::Sender<Result<SessionSnapshot, SessionError>>;

/// User intents, sent by [`SessionController`] handles
enum Command {
    Start {
        job: Option<JobListing>,
        resume: Option<ResumeText>,
        reply: Reply,
    },
    ToggleMute {
        muted: bool,
        reply: Reply,
    },
    End {
        reply: Reply,
    },
    Reset {
        reply: Reply,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Results of asynchronous work and transport notifications, tagged with the epoch
/// of the session attempt that produced them
enum Completion {
    Credential {
        epoch: u64,
        result: Result<JoinGrant, CredentialError>,
    },
    Connect {
        epoch: u64,
        result: Result<Arc<dyn RealtimeConnection>, TransportError>,
    },
    Transport {
        epoch: u64,
        event: TransportEvent,
    },
    MicrophonePublished {
        epoch: u64,
        result: Result<(), TransportError>,
    },
    MuteApplied {
        epoch: u64,
        muted: bool,
        result: Result<(), TransportError>,
        reply: Reply,
    },
}

/// Microphone device operations, applied by a per-session worker in request order
enum MicrophoneOp {
    Publish,
    Mute { muted: bool, reply: Reply },
}

/// Handle to the interview session lifecycle manager.
///
/// All state lives in a single background task; every intent and every network or
/// device completion is applied there one at a time. Cloning the handle is cheap.
/// When the last handle is dropped the task releases any live session and exits.
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    transitions: broadcast::Sender<Transition>,
    history: SessionHistory,
}

impl SessionController {
    /// Spawn the controller task on the current tokio runtime
    pub fn spawn(
        config: SessionConfig,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn RealtimeTransport>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(SessionSnapshot::default());
        let (transitions_tx, _) = broadcast::channel(TRANSITION_BUFFER);
        let history = SessionHistory::new(config.history_limit);

        let actor = SessionActor {
            config,
            credentials,
            transport,
            sink,
            snapshots: snapshots_tx,
            transitions: transitions_tx.clone(),
            history: history.clone(),
            completions: completions_tx,
            state: SessionState::Idle,
            last_error: None,
            epoch: 0,
            session: None,
        };

        tokio::spawn(actor.run(commands_rx, completions_rx));

        Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            transitions: transitions_tx,
            history,
        }
    }

    /// Current state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Observe the latest published state. Intermediate values may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Receive every connection state change from now on, in the order applied
    pub fn transitions(&self) -> broadcast::Receiver<Transition> {
        self.transitions.subscribe()
    }

    /// Past and running sessions
    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Begin a session. Returns once credential acquisition has started.
    pub async fn start(
        &self,
        job: Option<JobListing>,
        resume: Option<ResumeText>,
    ) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Start { job, resume, reply }).await
    }

    /// Mute or unmute the microphone. Returns after the device has switched.
    pub async fn toggle_mute(&self, muted: bool) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::ToggleMute { muted, reply }).await
    }

    /// End the session, releasing the connection and local media. Idempotent.
    pub async fn end(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::End { reply }).await
    }

    /// Return to Idle after a failure or a finished session
    pub async fn reset(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Release everything and stop the controller task
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> Command,
    ) -> Result<SessionSnapshot, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::ControllerClosed)?;
        response.await.map_err(|_| SessionError::ControllerClosed)?
    }
}

/// The live session owned by the controller task
struct ActiveSession {
    epoch: u64,
    room: String,
    identity: String,
    connection: Option<Arc<dyn RealtimeConnection>>,
    remote_track: Option<Arc<dyn RemoteTrack>>,
    /// Audio track announced before the Connected notification
    pending_track: Option<Arc<dyn RemoteTrack>>,
    microphone: Option<MicrophoneQueue>,
    microphone_requested: bool,
    event_forwarder: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn new(epoch: u64, room: String, identity: String) -> Self {
        Self {
            epoch,
            room,
            identity,
            connection: None,
            remote_track: None,
            pending_track: None,
            microphone: None,
            microphone_requested: false,
            event_forwarder: None,
        }
    }
}

/// The device worker for one connection
struct MicrophoneQueue {
    ops: mpsc::UnboundedSender<MicrophoneOp>,
    worker: JoinHandle<()>,
}

impl MicrophoneQueue {
    fn spawn(
        epoch: u64,
        connection: Arc<dyn RealtimeConnection>,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let (ops, mut pending) = mpsc::unbounded_channel();

        let worker = tokio::spawn(async move {
            while let Some(op) = pending.recv().await {
                let completion = match op {
                    MicrophoneOp::Publish => Completion::MicrophonePublished {
                        epoch,
                        result: connection.set_microphone_enabled(true).await,
                    },
                    MicrophoneOp::Mute { muted, reply } => Completion::MuteApplied {
                        epoch,
                        muted,
                        result: connection.set_microphone_enabled(!muted).await,
                        reply,
                    },
                };

                if completions.send(completion).is_err() {
                    break;
                }
            }
        });

        Self { ops, worker }
    }

    /// Let queued operations finish, then stop the worker
    async fn close(self) {
        let MicrophoneQueue { ops, mut worker } = self;
        drop(ops);

        if tokio::time::timeout(MICROPHONE_DRAIN_TIMEOUT, &mut worker).await.is_err() {
            warn!("Microphone operation did not finish in time, aborting");
            worker.abort();
        }
    }
}

struct SessionActor {
    config: SessionConfig,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn RealtimeTransport>,
    sink: Arc<dyn AudioSink>,
    snapshots: watch::Sender<SessionSnapshot>,
    transitions: broadcast::Sender<Transition>,
    history: SessionHistory,
    completions: mpsc::UnboundedSender<Completion>,
    state: SessionState,
    last_error: Option<LastError>,
    epoch: u64,
    session: Option<ActiveSession>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        debug!("Session controller started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("All controller handles dropped");
                        self.teardown().await;
                        break;
                    }
                },
                Some(completion) = completions.recv() => self.handle_completion(completion).await,
            }
        }

        info!("Session controller stopped");
    }

    /// Returns false when the controller should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start { job, resume, reply } => {
                let _ = reply.send(self.start(job, resume));
            }
            Command::ToggleMute { muted, reply } => self.toggle_mute(muted, reply),
            Command::End { reply } => {
                let result = self.end().await;
                let _ = reply.send(result);
            }
            Command::Reset { reply } => {
                let _ = reply.send(self.reset());
            }
            Command::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                return false;
            }
        }

        true
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Credential { epoch, result } => self.on_credential(epoch, result).await,
            Completion::Connect { epoch, result } => self.on_connect(epoch, result).await,
            Completion::Transport { epoch, event } => self.on_transport_event(epoch, event).await,
            Completion::MicrophonePublished { epoch, result } => {
                self.on_microphone_published(epoch, result)
            }
            Completion::MuteApplied {
                epoch,
                muted,
                result,
                reply,
            } => {
                let _ = reply.send(self.on_mute_applied(epoch, muted, result));
            }
        }
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    fn start(
        &mut self,
        job: Option<JobListing>,
        resume: Option<ResumeText>,
    ) -> Result<SessionSnapshot, SessionError> {
        let current = self.state.connection_state();
        if current.is_active() {
            return Err(SessionError::AlreadyActive(current));
        }

        let job = job.ok_or(SessionError::MissingJobListing)?;
        let resume = resume
            .filter(|r| !r.is_blank())
            .ok_or(SessionError::MissingResume)?;

        if current != ConnectionState::Idle {
            self.reset_to_idle();
        }

        self.epoch += 1;
        let epoch = self.epoch;
        let room = self.config.room_name(epoch);
        let identity = self.config.participant_identity();

        info!(
            epoch,
            room = %room,
            job_title = job.title().unwrap_or("untitled"),
            resume_chars = resume.as_str().len(),
            "Starting interview session"
        );

        self.history.begin(&room, job.title().unwrap_or(UNKNOWN_ROLE), chrono::Utc::now());
        self.session = Some(ActiveSession::new(epoch, room.clone(), identity.clone()));
        self.last_error = None;
        self.transition(SessionState::AcquiringCredential { room: room.clone() });

        let request = CredentialRequest {
            room,
            identity,
            display_name: self.config.display_name.clone(),
        };
        let credentials = Arc::clone(&self.credentials);
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let result = credentials.request_credential(&request).await;
            let _ = completions.send(Completion::Credential { epoch, result });
        });

        Ok(self.snapshot())
    }

    fn toggle_mute(&mut self, muted: bool, reply: Reply) {
        let state = self.state.connection_state();
        if state != ConnectionState::Connected {
            let _ = reply.send(Err(SessionError::NotConnected(state)));
            return;
        }

        let Some(queue) = self.session.as_ref().and_then(|s| s.microphone.as_ref()) else {
            let _ = reply.send(Err(SessionError::Microphone(
                "connection is still being established".to_string(),
            )));
            return;
        };

        // Applied after anything already queued, including the initial publish
        if let Err(mpsc::error::SendError(MicrophoneOp::Mute { reply, .. })) =
            queue.ops.send(MicrophoneOp::Mute { muted, reply })
        {
            let _ = reply.send(Err(SessionError::Microphone(
                "microphone worker stopped".to_string(),
            )));
        }
    }

    async fn end(&mut self) -> Result<SessionSnapshot, SessionError> {
        match self.state.connection_state() {
            ConnectionState::AcquiringCredential
            | ConnectionState::Connecting
            | ConnectionState::Connected => {
                let room = self.state.room().unwrap_or_default().to_string();
                info!(room = %room, "Ending interview session");

                self.transition(SessionState::Disconnecting { room });
                self.release_session(SessionOutcome::Ended).await;
                self.transition(SessionState::Disconnected);
            }
            other => debug!(state = ?other, "End requested without an active session"),
        }

        Ok(self.snapshot())
    }

    fn reset(&mut self) -> Result<SessionSnapshot, SessionError> {
        match self.state.connection_state() {
            ConnectionState::Idle => {}
            ConnectionState::Failed | ConnectionState::Disconnected => self.reset_to_idle(),
            other => {
                return Err(SessionError::InvalidTransition {
                    operation: "reset",
                    state: other,
                })
            }
        }

        Ok(self.snapshot())
    }

    async fn teardown(&mut self) {
        let _ = self.end().await;
        // Anything left over from an abandoned attempt
        self.release_session(SessionOutcome::Ended).await;
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    async fn on_credential(&mut self, epoch: u64, result: Result<JoinGrant, CredentialError>) {
        let Some(session) = self.session.as_ref().filter(|s| s.epoch == epoch) else {
            debug!(epoch, "Discarding credential response for abandoned session");
            return;
        };
        let request = CredentialRequest {
            room: session.room.clone(),
            identity: session.identity.clone(),
            display_name: self.config.display_name.clone(),
        };

        if self.state.connection_state() != ConnectionState::AcquiringCredential {
            return;
        }

        let credential = match result.and_then(|grant| SessionCredential::from_grant(grant, &request)) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(epoch, error = %e, "Credential acquisition failed");
                self.fail(SessionErrorKind::from(&e), e.to_string()).await;
                return;
            }
        };

        info!(epoch, endpoint = %credential.endpoint, "Credential obtained");

        self.transition(SessionState::Connecting {
            room: credential.room.clone(),
        });
        self.begin_connect(epoch, credential);
    }

    fn begin_connect(&mut self, epoch: u64, credential: SessionCredential) {
        // The event channel exists before connect is called, so nothing the transport
        // emits during the attempt is lost
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let completions = self.completions.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if completions.send(Completion::Transport { epoch, event }).is_err() {
                    break;
                }
            }
        });

        if let Some(session) = self.current(epoch) {
            session.event_forwarder = Some(forwarder);
        }

        let transport = Arc::clone(&self.transport);
        let completions = self.completions.clone();
        let timeout = self.config.connect_timeout;
        let request = ConnectRequest {
            credential,
            media: self.config.media.clone(),
        };

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.connect(request, events_tx)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            };
            let _ = completions.send(Completion::Connect { epoch, result });
        });
    }

    async fn on_connect(
        &mut self,
        epoch: u64,
        result: Result<Arc<dyn RealtimeConnection>, TransportError>,
    ) {
        if self.current(epoch).is_none() {
            if let Ok(connection) = result {
                info!(epoch, "Releasing connection from abandoned session");
                connection.disconnect().await;
            }
            return;
        }

        match (self.state.connection_state(), result) {
            (ConnectionState::Connecting, Err(e)) => {
                warn!(epoch, error = %e, "Connection failed");
                self.fail(SessionErrorKind::ConnectionFailed, e.to_string()).await;
            }
            (ConnectionState::Connected, Err(e)) => {
                warn!(epoch, error = %e, "Connection dropped while completing");
                self.last_error = Some(LastError::new(
                    SessionErrorKind::UnexpectedDisconnect,
                    e.to_string(),
                ));
                self.release_session(SessionOutcome::Disconnected).await;
                self.transition(SessionState::Disconnected);
            }
            (state, Ok(connection)) => {
                let completions = self.completions.clone();
                if let Some(session) = self.current(epoch) {
                    session.microphone = Some(MicrophoneQueue::spawn(
                        epoch,
                        Arc::clone(&connection),
                        completions,
                    ));
                    session.connection = Some(connection);
                }

                match state {
                    ConnectionState::Connecting => self.enter_connected(epoch),
                    // Connected notification arrived first
                    ConnectionState::Connected => self.request_microphone(epoch),
                    _ => {}
                }
            }
            (state, Err(e)) => debug!(?state, error = %e, "Ignoring connect failure"),
        }
    }

    async fn on_transport_event(&mut self, epoch: u64, event: TransportEvent) {
        if self.current(epoch).is_none() {
            debug!(epoch, ?event, "Discarding notification for abandoned session");
            return;
        }

        let state = self.state.connection_state();

        match event {
            TransportEvent::Connected => {
                if state == ConnectionState::Connecting {
                    self.enter_connected(epoch);
                }
            }
            TransportEvent::Disconnected { reason } => {
                if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
                    warn!(epoch, reason = %reason, "Session ended unexpectedly");
                    self.last_error = Some(LastError::new(
                        SessionErrorKind::UnexpectedDisconnect,
                        reason,
                    ));
                    self.release_session(SessionOutcome::Disconnected).await;
                    self.transition(SessionState::Disconnected);
                }
            }
            TransportEvent::TrackSubscribed(track) => {
                if track.kind() != TrackKind::Audio {
                    debug!(sid = track.sid(), kind = ?track.kind(), "Ignoring non-audio track");
                    return;
                }

                match state {
                    ConnectionState::Connected => self.bind_track(epoch, track),
                    ConnectionState::Connecting => {
                        if let Some(session) = self.current(epoch) {
                            session.pending_track = Some(track);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn on_microphone_published(&mut self, epoch: u64, result: Result<(), TransportError>) {
        if self.current(epoch).is_none() {
            return;
        }

        match result {
            Ok(()) => info!(epoch, "Microphone published"),
            Err(e) => {
                // The candidate can still hear the interviewer
                warn!(epoch, error = %e, "Microphone publish failed, continuing muted");
                self.last_error = Some(LastError::new(
                    SessionErrorKind::MicrophonePublishFailed,
                    e.to_string(),
                ));
                self.update_connected(|muted, _| *muted = true);
            }
        }
    }

    fn on_mute_applied(
        &mut self,
        epoch: u64,
        muted: bool,
        result: Result<(), TransportError>,
    ) -> Result<SessionSnapshot, SessionError> {
        let state = self.state.connection_state();
        if self.current(epoch).is_none() || state != ConnectionState::Connected {
            return Err(SessionError::NotConnected(state));
        }

        match result {
            Ok(()) => {
                if !muted && self.last_error_kind() == Some(SessionErrorKind::MicrophonePublishFailed) {
                    self.last_error = None;
                }
                self.update_connected(|microphone_muted, _| *microphone_muted = muted);
                info!(muted, "Microphone state changed");
                Ok(self.snapshot())
            }
            Err(e) => {
                warn!(muted, error = %e, "Failed to change microphone state");
                Err(SessionError::Microphone(e.to_string()))
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn current(&mut self, epoch: u64) -> Option<&mut ActiveSession> {
        self.session.as_mut().filter(|s| s.epoch == epoch)
    }

    fn enter_connected(&mut self, epoch: u64) {
        let Some(session) = self.current(epoch) else {
            return;
        };
        let room = session.room.clone();
        let pending = session.pending_track.take();

        self.transition(SessionState::Connected {
            room,
            microphone_muted: false,
            remote_audio_bound: false,
        });

        if let Some(track) = pending {
            self.bind_track(epoch, track);
        }

        self.request_microphone(epoch);
    }

    fn request_microphone(&mut self, epoch: u64) {
        let Some(session) = self.current(epoch) else {
            return;
        };
        if session.microphone_requested {
            return;
        }
        let Some(queue) = session.microphone.as_ref() else {
            debug!(epoch, "Microphone publish waits for connect to complete");
            return;
        };

        if queue.ops.send(MicrophoneOp::Publish).is_ok() {
            session.microphone_requested = true;
        }
    }

    /// Bind `track` to the output sink. The most recent track wins.
    fn bind_track(&mut self, epoch: u64, track: Arc<dyn RemoteTrack>) {
        let sink = Arc::clone(&self.sink);
        let Some(session) = self.current(epoch) else {
            return;
        };

        if let Some(previous) = session.remote_track.take() {
            debug!(previous = previous.sid(), next = track.sid(), "Replacing remote audio track");
            previous.detach();
            if let Err(e) = sink.finish() {
                warn!("Failed to close {} sink: {}", sink.name(), e);
            }
        }

        match track.attach(Arc::clone(&sink)) {
            Ok(()) => {
                info!(sid = track.sid(), sink = sink.name(), "Remote audio bound");
                session.remote_track = Some(track);
                self.update_connected(|_, bound| *bound = true);
            }
            Err(e) => {
                warn!(sid = track.sid(), error = %e, "Failed to bind remote audio");
                self.update_connected(|_, bound| *bound = false);
            }
        }
    }

    /// Release the session's connection, tracks and forwarder, and close its history
    /// record. Safe without a session.
    async fn release_session(&mut self, outcome: SessionOutcome) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Some(forwarder) = session.event_forwarder.take() {
            forwarder.abort();
        }

        if let Some(track) = session.remote_track.take() {
            track.detach();
            if let Err(e) = self.sink.finish() {
                warn!("Failed to close {} sink: {}", self.sink.name(), e);
            }
        }
        session.pending_track = None;

        if let Some(microphone) = session.microphone.take() {
            microphone.close().await;
        }

        if let Some(connection) = session.connection.take() {
            connection.disconnect().await;
        }

        self.history.finish(&session.room, outcome, chrono::Utc::now());

        info!(epoch = session.epoch, room = %session.room, ?outcome, "Session resources released");
    }

    async fn fail(&mut self, kind: SessionErrorKind, message: String) {
        self.release_session(SessionOutcome::Failed).await;
        self.last_error = Some(LastError::new(kind, message));
        self.transition(SessionState::Failed);
    }

    fn reset_to_idle(&mut self) {
        self.last_error = None;
        self.transition(SessionState::Idle);
    }

    fn update_connected(&mut self, update: impl FnOnce(&mut bool, &mut bool)) {
        if let SessionState::Connected {
            microphone_muted,
            remote_audio_bound,
            ..
        } = &mut self.state
        {
            update(microphone_muted, remote_audio_bound);
            self.publish();
        }
    }

    fn transition(&mut self, next: SessionState) {
        let from = self.state.connection_state();
        let to = next.connection_state();

        if !from.can_transition_to(to) {
            error!(?from, ?to, "Refusing undefined session transition");
            return;
        }

        if from != to {
            info!(?from, ?to, "Session state changed");
            let _ = self.transitions.send(Transition { from, to });
        }

        self.state = next;
        self.publish();
    }

    fn last_error_kind(&self) -> Option<SessionErrorKind> {
        self.last_error.as_ref().map(|e| e.kind)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}
