//! One-shot verification sessions.
//!
//! Each external trigger arms the session for exactly one attempt. The first
//! successful attempt enrolls a reference embedding; every later one is
//! scored against it. Failed attempts consume the trigger and produce no
//! score.

use crate::alignment::align_frame;
use crate::debug::{DebugSink, DebugSlot, DebugView, NoDebug};
use crate::detector::{DetectorError, FaceDetector};
use crate::embedding::{self, Embedding, EmbeddingError};
use crate::geometry::{AlignmentTransform, GeometryError, DEFAULT_EYE_DISTANCE};
use crate::normalizer::{normalize_patch, CanonicalPatch};
use crate::recognizer::{EmbeddingEngine, RecognizerError};
use crate::roi::{extract_roi, RoiError, DEFAULT_PATCH_SIZE};
use crate::types::Frame;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Why an armed attempt ended without enrollment or a score.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("face is missing eye landmarks")]
    MissingLandmarks,
    #[error("detector failed: {0}")]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    DegenerateGeometry(#[from] GeometryError),
    #[error(transparent)]
    InsufficientFrameSize(#[from] RoiError),
    #[error("inference unavailable: {0}")]
    InferenceUnavailable(#[from] RecognizerError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Result of offering one frame to the session.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Session was not armed; the frame was ignored.
    Idle,
    /// First successful attempt; the reference embedding was stored.
    Enrolled,
    /// Attempt scored against the reference.
    Compared { similarity: f32 },
    /// Attempt consumed the trigger but produced nothing.
    Aborted(AttemptError),
}

impl AttemptOutcome {
    /// Similarity score, if this outcome carries one.
    pub fn similarity(&self) -> Option<f32> {
        match self {
            AttemptOutcome::Compared { similarity } => Some(*similarity),
            _ => None,
        }
    }
}

/// Cross-thread activation trigger.
///
/// Cloned handles share one flag. Arming an already armed flag is a no-op:
/// triggers are never queued.
#[derive(Debug, Clone, Default)]
pub struct ActivationFlag {
    armed: Arc<AtomicBool>,
}

impl ActivationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the session. Returns `false` if it was already armed.
    pub fn arm(&self) -> bool {
        !self.armed.swap(true, Ordering::AcqRel)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Consume the trigger, returning whether it was set.
    fn take(&self) -> bool {
        self.armed.swap(false, Ordering::AcqRel)
    }
}

/// Phase of the one-shot activation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Not armed; frames are ignored.
    Idle,
    /// Trigger consumed; the current frame is being attempted.
    Armed,
    /// Attempt finished (with or without output).
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseEvent {
    Triggered,
    AttemptFinished,
    Settled,
}

impl SessionPhase {
    fn on(self, event: PhaseEvent) -> SessionPhase {
        match (self, event) {
            (SessionPhase::Idle, PhaseEvent::Triggered) => SessionPhase::Armed,
            (SessionPhase::Armed, PhaseEvent::AttemptFinished) => SessionPhase::Resolved,
            (SessionPhase::Resolved, PhaseEvent::Settled) => SessionPhase::Idle,
            (phase, event) => {
                tracing::warn!(?phase, ?event, "ignored out-of-order session event");
                phase
            }
        }
    }
}

/// Per-process session state: the enrolled reference and the trigger.
#[derive(Debug)]
pub struct SessionState {
    reference: Option<Embedding>,
    activation: ActivationFlag,
    phase: SessionPhase,
}

impl SessionState {
    pub fn new(activation: ActivationFlag) -> Self {
        Self {
            reference: None,
            activation,
            phase: SessionPhase::Idle,
        }
    }

    pub fn activation(&self) -> &ActivationFlag {
        &self.activation
    }

    pub fn reference(&self) -> Option<&Embedding> {
        self.reference.as_ref()
    }

    pub fn is_enrolled(&self) -> bool {
        self.reference.is_some()
    }

    /// Current phase. An idle session whose flag has been set reports `Armed`
    /// until the worker consumes the trigger.
    pub fn phase(&self) -> SessionPhase {
        match self.phase {
            SessionPhase::Idle if self.activation.is_armed() => SessionPhase::Armed,
            phase => phase,
        }
    }

    fn advance(&mut self, event: PhaseEvent) {
        self.phase = self.phase.on(event);
    }
}

/// Tunables for the alignment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Inter-eye distance after alignment, in pixels.
    pub eye_distance: f64,
    /// Side of the canonical patch, in pixels.
    pub patch_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            eye_distance: DEFAULT_EYE_DISTANCE,
            patch_size: DEFAULT_PATCH_SIZE,
        }
    }
}

/// Detector, alignment, normalization and inference wired together.
pub struct SessionPipeline<D, E> {
    detector: D,
    engine: E,
    config: PipelineConfig,
    debug: Box<dyn DebugSink>,
}

impl<D: FaceDetector, E: EmbeddingEngine> SessionPipeline<D, E> {
    pub fn new(detector: D, engine: E, config: PipelineConfig) -> Self {
        Self {
            detector,
            engine,
            config,
            debug: Box::new(NoDebug),
        }
    }

    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.debug = sink;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Offer one frame to the session.
    ///
    /// Unarmed sessions ignore the frame. Armed sessions consume the trigger
    /// and make exactly one attempt; every intermediate buffer is dropped
    /// before this returns, whatever the exit path.
    pub fn process_frame(&mut self, frame: Frame, state: &mut SessionState) -> AttemptOutcome {
        if !state.activation.take() {
            return AttemptOutcome::Idle;
        }
        state.advance(PhaseEvent::Triggered);

        let outcome = match self.attempt(&frame, state) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::debug!(error = %err, "attempt aborted");
                AttemptOutcome::Aborted(err)
            }
        };
        drop(frame);

        state.advance(PhaseEvent::AttemptFinished);
        state.advance(PhaseEvent::Settled);
        outcome
    }

    fn attempt(&mut self, frame: &Frame, state: &mut SessionState) -> Result<AttemptOutcome, AttemptError> {
        let faces = self.detector.detect(frame)?;
        let face = faces.first().ok_or(AttemptError::NoFaceDetected)?;
        let (left_eye, right_eye) = face.landmarks.eyes().ok_or(AttemptError::MissingLandmarks)?;

        let transform = AlignmentTransform::from_eyes(left_eye, right_eye, self.config.eye_distance)?;
        tracing::trace!(
            angle = transform.angle_deg,
            scale = transform.scale,
            confidence = face.bounds.confidence,
            "eye transform"
        );

        let patch = {
            let aligned = align_frame(frame, &transform);
            let roi = extract_roi(&aligned, transform.pivot, self.config.patch_size)?;
            let patch = normalize_patch(&roi.patch, self.config.patch_size);
            let slot = if state.is_enrolled() {
                DebugSlot::Candidate
            } else {
                DebugSlot::Reference
            };
            self.emit_debug(slot, &roi.patch, &patch);
            patch
        };

        let raw = self.engine.embed(&patch)?;
        let candidate = embedding::normalize(&raw)?;

        if let Some(reference) = state.reference.as_ref() {
            let similarity = embedding::similarity(reference, &candidate)?;
            tracing::info!(similarity, "candidate compared against reference");
            return Ok(AttemptOutcome::Compared { similarity });
        }

        tracing::info!(dim = candidate.dim(), "reference embedding enrolled");
        state.reference = Some(candidate);
        Ok(AttemptOutcome::Enrolled)
    }

    fn emit_debug(&self, slot: DebugSlot, crop: &Frame, patch: &CanonicalPatch) {
        if !self.debug.enabled() {
            return;
        }
        self.debug.submit(DebugView {
            slot,
            crop: crop.to_rgb_image(),
            normalized: patch.to_rgb_image(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_is_not_queued() {
        let flag = ActivationFlag::new();
        assert!(!flag.is_armed());
        assert!(flag.arm());
        assert!(!flag.arm(), "second arm while armed must be a no-op");
        assert!(flag.take());
        assert!(!flag.take(), "one trigger yields one attempt");
    }

    #[test]
    fn test_flag_shared_between_clones() {
        let flag = ActivationFlag::new();
        let remote = flag.clone();
        remote.arm();
        assert!(flag.is_armed());
    }

    #[test]
    fn test_flag_across_threads() {
        let flag = ActivationFlag::new();
        let remote = flag.clone();
        std::thread::spawn(move || {
            remote.arm();
        })
        .join()
        .unwrap();
        assert!(flag.take());
    }

    #[test]
    fn test_phase_transitions() {
        use PhaseEvent::*;
        assert_eq!(SessionPhase::Idle.on(Triggered), SessionPhase::Armed);
        assert_eq!(SessionPhase::Armed.on(AttemptFinished), SessionPhase::Resolved);
        assert_eq!(SessionPhase::Resolved.on(Settled), SessionPhase::Idle);
        // Out-of-order events leave the phase alone.
        assert_eq!(SessionPhase::Idle.on(AttemptFinished), SessionPhase::Idle);
        assert_eq!(SessionPhase::Armed.on(Triggered), SessionPhase::Armed);
    }

    #[test]
    fn test_arm_reports_armed_phase() {
        let state = SessionState::new(ActivationFlag::new());
        assert_eq!(state.phase(), SessionPhase::Idle);

        let remote = state.activation().clone();
        remote.arm();
        assert_eq!(state.phase(), SessionPhase::Armed);

        assert!(state.activation().take());
        assert_eq!(state.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_outcome_similarity() {
        assert_eq!(AttemptOutcome::Compared { similarity: 0.5 }.similarity(), Some(0.5));
        assert_eq!(AttemptOutcome::Enrolled.similarity(), None);
        assert_eq!(AttemptOutcome::Aborted(AttemptError::NoFaceDetected).similarity(), None);
    }
}
