use anyhow::{Context, Result};
use clap::Parser;
use serenity_pod::audio::{AudioBackendFactory, AudioCapture, AudioSource, CaptureConfig};
use serenity_pod::emotion::{
    EmotionSampler, FaceDetection, FaceDetector, HttpFaceDetector, LatestFrame, SamplerConfig,
    VideoFrame,
};
use serenity_pod::gateway::{Gateways, OpenAiClient};
use serenity_pod::session::{SessionConfig, SessionOrchestrator};
use serenity_pod::store::{
    AuthProvider, ConversationStore, FirebaseAuth, FirestoreStore, RemoteStore,
};
use serenity_pod::{create_router, AppState, Config, Credentials};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long an uploaded camera frame stays current
const FRAME_MAX_AGE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "serenity-pod", version, about = "Emotion-aware voice companion service")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/serenity-pod")]
    config: String,

    /// Replay a WAV file instead of the live microphone
    #[arg(long)]
    audio_file: Option<String>,
}

/// Stand-in when no detector service is configured
struct NoDetector;

#[async_trait::async_trait]
impl FaceDetector for NoDetector {
    async fn detect(&self, _frame: &VideoFrame) -> Result<Vec<FaceDetection>> {
        anyhow::bail!("no face detector configured")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;
    let credentials = Credentials::from_env()?;

    info!("SerenityPod v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    // Speech and chat providers
    let openai = Arc::new(OpenAiClient::new(&credentials.openai_api_key, &cfg.gateway)?);
    let gateways = Arc::new(Gateways::from_config(
        &cfg.gateway,
        cfg.audio.min_recording_bytes,
        openai.clone(),
        openai.clone(),
        openai,
    ));

    // Persistence and auth
    let (remote, auth): (Option<Arc<dyn RemoteStore>>, Option<Arc<FirebaseAuth>>) =
        match &credentials.firebase {
            Some(firebase) => {
                let auth = Arc::new(FirebaseAuth::new(&firebase.api_key)?);
                let firestore = FirestoreStore::new(&firebase.project_id, &firebase.api_key)?
                    .with_auth(Arc::clone(&auth));
                info!("Remote store: Firestore project {}", firebase.project_id);
                (Some(Arc::new(firestore) as Arc<dyn RemoteStore>), Some(auth))
            }
            None => {
                warn!("FIREBASE_API_KEY / FIREBASE_PROJECT_ID not set, storing conversations locally only");
                (None, None)
            }
        };
    let store = Arc::new(ConversationStore::from_config(&cfg.store, remote));
    info!("Local conversations: {}", store.local().dir().display());
    let connectivity_task = if store.has_remote() {
        let online = store.refresh_online().await;
        info!("Remote store reachable: {}", online);
        Some(store.spawn_connectivity_monitor(Duration::from_secs(
            cfg.store.connectivity_check_secs.max(1),
        )))
    } else {
        None
    };

    // Emotion sampling
    let frames = Arc::new(LatestFrame::new(FRAME_MAX_AGE));
    let detector: Arc<dyn FaceDetector> = match &cfg.emotion.detector_url {
        Some(url) => {
            info!("Face detector: {}", url);
            Arc::new(HttpFaceDetector::new(url.clone())?)
        }
        None => {
            warn!("No face detector configured, emotion context will be empty");
            Arc::new(NoDetector)
        }
    };
    let sampler = Arc::new(EmotionSampler::new(
        SamplerConfig::from(&cfg.emotion),
        frames.clone(),
        detector,
    ));
    let mut sampler_task = sampler.spawn();

    // Audio capture
    let source = match args.audio_file {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };
    let backend = AudioBackendFactory::create(source).context("Failed to create audio backend")?;
    let capture = AudioCapture::new(CaptureConfig::from(&cfg.audio), backend);

    let session = Arc::new(SessionOrchestrator::new(
        SessionConfig::from_config(&cfg.audio, &cfg.gateway),
        capture,
        sampler.clone(),
        gateways,
        store.clone(),
    ));

    // Follow sign-in changes
    if let Some(auth) = &auth {
        let mut changes = auth.on_auth_change();
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            while let Some(user) = changes.changed().await {
                session.set_user(user.map(|u| u.uid));
            }
        });
    }

    let state = AppState {
        service: cfg.service.name.clone(),
        session: session.clone(),
        sampler,
        frames,
        store,
        auth: auth.map(|a| a as Arc<dyn AuthProvider>),
    };

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    sampler_task.stop();
    if let Some(task) = connectivity_task {
        task.abort();
    }
    session.teardown().await;
    info!("Stopped");

    Ok(())
}
