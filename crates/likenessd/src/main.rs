use anyhow::{Context, Result};
use likeness_core::{FaceNetEmbedder, ScrfdDetector, SessionPipeline};
use likeness_hw::Camera;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod debug_writer;
mod engine;

use config::Config;
use dbus_interface::{LikenessService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("likenessd starting");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::debug!(?config, "configuration");

    // Camera and models fail fast before anything is served.
    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let detector = ScrfdDetector::load(&config.scrfd_model_path()).context("failed to load SCRFD detector")?;
    let embedder = FaceNetEmbedder::load(&config.facenet_model_path(), config.embedder_layout)
        .context("failed to load FaceNet embedder")?;

    let mut pipeline = SessionPipeline::new(detector, embedder, config.pipeline);
    if let Some(dir) = &config.debug_dir {
        let sink = debug_writer::spawn_debug_writer(dir.clone())
            .with_context(|| format!("failed to create debug directory {}", dir.display()))?;
        pipeline = pipeline.with_debug_sink(Box::new(sink));
        tracing::info!(dir = %dir.display(), "debug views enabled");
    }

    let engine = engine::spawn_engine(camera, pipeline, config.similarity_threshold, config.warmup_frames)?;

    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, LikenessService::new(engine))?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "likenessd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("likenessd shutting down");

    Ok(())
}
