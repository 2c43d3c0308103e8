use likeness_core::{ActivationFlag, AttemptOutcome, EmbeddingEngine, FaceDetector, Frame, SessionPipeline, SessionState};
use likeness_hw::Camera;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self as std_mpsc, TrySendError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

/// Snapshot of the session published to D-Bus callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub version: &'static str,
    pub enrolled: bool,
    pub armed: bool,
    /// Attempts that consumed a trigger, successful or not.
    pub attempts: u64,
    pub last_similarity: Option<f32>,
    /// Whether `last_similarity` reached the configured threshold.
    pub matched: Option<bool>,
    pub last_error: Option<String>,
    pub threshold: f32,
    pub frames_processed: u64,
    pub frames_dropped: u64,
}

#[derive(Debug, Default)]
struct FrameCounters {
    processed: AtomicU64,
    dropped: AtomicU64,
}

/// Clone-safe handle to the capture and worker threads.
#[derive(Clone)]
pub struct EngineHandle {
    activation: ActivationFlag,
    status: watch::Receiver<EngineStatus>,
    counters: Arc<FrameCounters>,
}

impl EngineHandle {
    /// Arm the session for one attempt. Returns `false` if already armed.
    pub fn arm(&self) -> bool {
        self.activation.arm()
    }

    pub fn status(&self) -> EngineStatus {
        let mut status = self.status.borrow().clone();
        status.armed = self.activation.is_armed();
        status.frames_processed = self.counters.processed.load(Ordering::Relaxed);
        status.frames_dropped = self.counters.dropped.load(Ordering::Relaxed);
        status
    }
}

/// Fold one attempt outcome into the published status.
fn record_outcome(status: &mut EngineStatus, outcome: &AttemptOutcome, enrolled: bool) {
    status.enrolled = enrolled;
    match outcome {
        AttemptOutcome::Idle => return,
        AttemptOutcome::Enrolled => {
            status.last_similarity = None;
            status.matched = None;
            status.last_error = None;
        }
        AttemptOutcome::Compared { similarity } => {
            status.last_similarity = Some(*similarity);
            status.matched = Some(*similarity >= status.threshold);
            status.last_error = None;
        }
        AttemptOutcome::Aborted(err) => {
            status.last_error = Some(err.to_string());
        }
    }
    status.attempts += 1;
}

/// Run the session over a stream of frames until the sender hangs up.
fn run_worker<D, E>(
    frames: std_mpsc::Receiver<Frame>,
    mut pipeline: SessionPipeline<D, E>,
    mut state: SessionState,
    status: watch::Sender<EngineStatus>,
    counters: Arc<FrameCounters>,
) where
    D: FaceDetector,
    E: EmbeddingEngine,
{
    let threshold = status.borrow().threshold;
    tracing::info!(threshold, "frame worker started");
    while let Ok(frame) = frames.recv() {
        counters.processed.fetch_add(1, Ordering::Relaxed);
        let outcome = pipeline.process_frame(frame, &mut state);
        if matches!(outcome, AttemptOutcome::Idle) {
            continue;
        }
        match &outcome {
            AttemptOutcome::Compared { similarity } => {
                tracing::info!(similarity, matched = *similarity >= threshold, "similarity");
            }
            AttemptOutcome::Aborted(err) => tracing::info!(reason = %err, "attempt produced no score"),
            _ => {}
        }
        let enrolled = state.is_enrolled();
        status.send_modify(|s| record_outcome(s, &outcome, enrolled));
    }
    tracing::info!("frame worker exiting");
}

/// Offer a frame to the worker without waiting. Returns `false` once the
/// worker is gone.
fn offer_frame(tx: &std_mpsc::SyncSender<Frame>, frame: Frame, counters: &FrameCounters) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            let dropped = counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!(dropped, "worker busy, frame dropped");
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Spawn the capture thread and the frame worker.
///
/// Frames reach the worker through a zero-capacity rendezvous: a frame that
/// arrives while the worker is busy is dropped, never queued.
pub fn spawn_engine<D, E>(
    camera: Camera,
    pipeline: SessionPipeline<D, E>,
    similarity_threshold: f32,
    warmup_frames: usize,
) -> Result<EngineHandle, EngineError>
where
    D: FaceDetector + Send + 'static,
    E: EmbeddingEngine + Send + 'static,
{
    let activation = ActivationFlag::new();
    let state = SessionState::new(activation.clone());
    let counters = Arc::new(FrameCounters::default());
    let (status_tx, status_rx) = watch::channel(EngineStatus {
        version: env!("CARGO_PKG_VERSION"),
        threshold: similarity_threshold,
        ..EngineStatus::default()
    });
    let (frame_tx, frame_rx) = std_mpsc::sync_channel::<Frame>(0);

    let worker_counters = counters.clone();
    std::thread::Builder::new()
        .name("likeness-worker".into())
        .spawn(move || run_worker(frame_rx, pipeline, state, status_tx, worker_counters))
        .map_err(|source| EngineError::Spawn { name: "worker", source })?;

    let capture_counters = counters.clone();
    std::thread::Builder::new()
        .name("likeness-capture".into())
        .spawn(move || {
            if warmup_frames > 0 {
                tracing::info!(count = warmup_frames, "discarding warmup frames");
                for _ in 0..warmup_frames {
                    let _ = camera.capture_frame();
                }
            }
            tracing::info!(device = %camera.device_path, "capture started");
            let result = camera.stream_frames(|frame| offer_frame(&frame_tx, frame, &capture_counters));
            match result {
                Ok(()) => tracing::info!("capture stopped"),
                Err(err) => tracing::error!(error = %err, "capture failed"),
            }
        })
        .map_err(|source| EngineError::Spawn { name: "capture", source })?;

    Ok(EngineHandle {
        activation,
        status: status_rx,
        counters,
    })
}
