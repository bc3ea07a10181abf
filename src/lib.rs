pub mod audio;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod ingestion;
pub mod session;
pub mod transport;

pub use audio::{
    AudioCapture, AudioFile, AudioFrame, AudioSink, CaptureConfig, RecordingMetadata,
    WavFileCapture, WavRecorder,
};
pub use config::Config;
pub use credentials::{CredentialProvider, CredentialRequest, HttpCredentialClient, JoinGrant, SessionCredential};
pub use error::{CredentialError, IngestionError, SessionError, SessionErrorKind, TransportError};
pub use http::{create_router, AppState};
pub use ingestion::{IngestionClient, JobListing, ResumeText};
pub use session::{
    ConnectionState, LastError, SessionAnalytics, SessionConfig, SessionController, SessionHistory,
    SessionOutcome, SessionRecord, SessionSnapshot, SessionState, Transition,
};
pub use transport::{
    ConnectRequest, MediaConfig, NatsTransport, RealtimeConnection, RealtimeTransport, RemoteTrack,
    TrackKind, TransportEvent,
};
