use anyhow::{Context, Result};
use chrono::Local;
use rollcall_core::{AttendanceSession, FaceEncoder, FaceMatcher, OnnxFaceEncoder};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod engine;
mod gate;
mod local_log;
mod protocol;
mod publisher;
mod recorder;
mod roster_source;
mod server;
mod store;
#[cfg(test)]
mod testing;

use app::App;
use engine::WorkerContext;
use gate::ConnectionGate;
use local_log::LocalLog;
use publisher::Publisher;
use roster_source::{FileRosterSource, HttpRosterSource, RosterSource};
use store::{AggregateStore, HttpAggregateStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(?config, "rollcalld starting");
    if config.tolerance_too_strict_for_arcface() {
        tracing::warn!(
            tolerance = config.tolerance,
            min_similarity = rollcall_core::unit_similarity(config.tolerance),
            suggested = rollcall_core::unit_distance(config::ARCFACE_SUGGESTED_SIMILARITY),
            "tolerance is strict for ArcFace embeddings; most live faces will not match"
        );
    }

    // One encoder per worker; the first one also encodes the roster photos.
    let mut encoders: Vec<Box<dyn FaceEncoder>> = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        let encoder = OnnxFaceEncoder::from_model_dir(&config.model_dir)
            .with_context(|| {
                format!("failed to load face models from {}", config.model_dir.display())
            })?;
        encoders.push(Box::new(encoder));
    }
    tracing::info!(
        workers = encoders.len(),
        dir = %config.model_dir.display(),
        "face models loaded"
    );

    let source: Box<dyn RosterSource> = match (&config.roster_file, &config.store_url) {
        (Some(path), _) => Box::new(FileRosterSource::new(path)),
        (None, Some(url)) => Box::new(HttpRosterSource::new(
            url,
            &config.roster_collection,
            config.store_token.clone(),
        )),
        (None, None) => anyhow::bail!("no roster source configured"),
    };
    let roster_encoder = encoders.pop().context("no frame workers configured")?;
    let (roster, roster_encoder) = roster_source::load_roster(source.as_ref(), roster_encoder)
        .await
        .context("failed to load roster")?;
    encoders.push(roster_encoder);
    if roster.is_empty() {
        tracing::warn!("roster is empty; no face will be recognized");
    }
    let roster_size = roster.len();

    let started_at = Local::now();
    let session = AttendanceSession::start(started_at);
    let session_id = session.id().to_string();
    let log = LocalLog::open(&config.log_dir, &started_at).unwrap_or_else(|e| {
        tracing::error!(error = %e, "local attendance log unavailable; records stay in memory");
        LocalLog::detached(&config.log_dir, &started_at)
    });
    let recorder = recorder::spawn_recorder(session, log)?;

    let publish_timeout = Duration::from_secs(config.publish_timeout_secs);
    let store: Arc<dyn AggregateStore> = if config.dry_run {
        tracing::info!("dry run: published attendance is kept in memory");
        Arc::new(MemoryStore::default())
    } else {
        let url = config.store_url.clone().context("store_url is required")?;
        Arc::new(HttpAggregateStore::new(
            url,
            &config.attendance_collection,
            config.store_token.clone(),
            publish_timeout,
        )?)
    };
    let publisher = Arc::new(Publisher::new(recorder.clone(), store, publish_timeout));

    let gate = Arc::new(ConnectionGate::new());
    let pipeline = engine::spawn_workers(
        encoders,
        WorkerContext {
            gate: Arc::clone(&gate),
            matcher: FaceMatcher::new(Arc::new(roster), config.tolerance),
            recorder: recorder.clone(),
        },
        config.frame_queue_depth,
    )?;

    let app = Arc::new(App::new(
        gate,
        recorder,
        publisher,
        pipeline,
        roster_size,
        session_id.clone(),
    ));
    tracing::info!(%session_id, roster_size, "rollcalld ready");

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let served = server::serve(listener, Arc::clone(&app), server::shutdown_signal()).await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "server stopped with an error");
    }

    app.shutdown().await;
    tracing::info!("rollcalld stopped");
    served.context("server error")
}
