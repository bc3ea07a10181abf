use anyhow::{Context, Result};
use clap::Parser;
use mock_interview::audio::{AudioCapture, WavFileCapture, WavRecorder};
use mock_interview::transport::CaptureFactory;
use mock_interview::{
    create_router, AppState, Config, HttpCredentialClient, IngestionClient, NatsTransport,
    SessionController,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mock-interview")]
#[command(about = "Mock interview session service")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/mock-interview")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// WAV file played as the candidate's microphone
    #[arg(long)]
    mic_wav: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;
    if let Some(bind) = cli.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = cli.port {
        cfg.service.http.port = port;
    }
    if let Some(mic_wav) = cli.mic_wav {
        cfg.audio.microphone_wav = Some(mic_wav);
    }

    info!("Mock Interview v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Ingestion service: {}", cfg.ingestion.base_url);
    info!("Credential service: {}", cfg.credentials.base_url);

    let ingestion = IngestionClient::new(
        cfg.ingestion.base_url.clone(),
        Duration::from_secs(cfg.ingestion.timeout_secs),
    )
    .context("Failed to create ingestion client")?;

    let credentials = HttpCredentialClient::new(
        cfg.credentials.base_url.clone(),
        Duration::from_secs(cfg.credentials.timeout_secs),
    )
    .context("Failed to create credential client")?;

    let mut transport = NatsTransport::new();
    match cfg.audio.microphone_wav.clone() {
        Some(path) => {
            info!("Microphone: playing {}", path);
            let capture_config = cfg.capture_config();
            let factory: CaptureFactory = Arc::new(move || {
                let capture: Box<dyn AudioCapture> =
                    Box::new(WavFileCapture::new(path.clone(), capture_config.clone()));
                Ok(capture)
            });
            transport = transport.with_capture(factory);
        }
        None => info!("Microphone: none configured, sessions will start muted"),
    }

    let recorder = WavRecorder::new(&cfg.audio.recordings_path, "interviewer")
        .context("Failed to create recordings directory")?;

    let controller = SessionController::spawn(
        cfg.session_config(),
        Arc::new(credentials),
        Arc::new(transport),
        Arc::new(recorder),
    );

    let app = create_router(AppState::new(controller.clone(), ingestion));

    let addr: SocketAddr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port)
        .parse()
        .context("Invalid HTTP bind address")?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Releasing interview session");
    controller.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
