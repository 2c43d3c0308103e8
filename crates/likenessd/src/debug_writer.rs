//! PNG rendering of debug views on a background task.

use likeness_core::debug::{DebugSink, DebugView};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Views waiting to be written; further views are dropped.
const DEBUG_QUEUE_DEPTH: usize = 2;

/// Debug sink that hands views to the PNG writer task without blocking.
pub struct PngDebugSink {
    tx: mpsc::Sender<DebugView>,
}

impl DebugSink for PngDebugSink {
    fn submit(&self, view: DebugView) {
        match self.tx.try_send(view) {
            Ok(()) => {}
            Err(TrySendError::Full(view)) => {
                tracing::trace!(slot = view.slot.as_str(), "debug writer busy, view dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("debug writer gone, view dropped");
            }
        }
    }
}

/// Write `{slot}_crop.png` and `{slot}_normalized.png` into `dir`.
pub fn write_view(dir: &Path, view: &DebugView) -> Result<(), image::ImageError> {
    let slot = view.slot.as_str();
    view.crop.save(dir.join(format!("{slot}_crop.png")))?;
    view.normalized.save(dir.join(format!("{slot}_normalized.png")))?;
    Ok(())
}

/// Create `dir` and spawn the writer task on the current runtime.
pub fn spawn_debug_writer(dir: PathBuf) -> std::io::Result<PngDebugSink> {
    std::fs::create_dir_all(&dir)?;
    let (tx, mut rx) = mpsc::channel::<DebugView>(DEBUG_QUEUE_DEPTH);

    tokio::spawn(async move {
        tracing::info!(dir = %dir.display(), "debug writer started");
        while let Some(view) = rx.recv().await {
            let dir = dir.clone();
            let written = tokio::task::spawn_blocking(move || write_view(&dir, &view).map(|()| view.slot)).await;
            match written {
                Ok(Ok(slot)) => tracing::debug!(slot = slot.as_str(), "debug view written"),
                Ok(Err(err)) => tracing::warn!(error = %err, "failed to write debug view"),
                Err(err) => tracing::warn!(error = %err, "debug writer task panicked"),
            }
        }
    });

    Ok(PngDebugSink { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use likeness_core::debug::DebugSlot;
    use std::time::Duration;

    fn view(slot: DebugSlot) -> DebugView {
        DebugView {
            slot,
            crop: RgbImage::from_pixel(8, 8, Rgb([200, 10, 10])),
            normalized: RgbImage::from_pixel(8, 8, Rgb([10, 10, 200])),
        }
    }

    #[test]
    fn test_write_view_files() {
        let dir = tempfile::tempdir().unwrap();
        write_view(dir.path(), &view(DebugSlot::Candidate)).unwrap();

        let crop = image::open(dir.path().join("candidate_crop.png")).unwrap().to_rgb8();
        assert_eq!(crop.dimensions(), (8, 8));
        assert_eq!(crop.get_pixel(3, 3), &Rgb([200, 10, 10]));
        assert!(dir.path().join("candidate_normalized.png").exists());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel::<DebugView>(1);
        let sink = PngDebugSink { tx };
        sink.submit(view(DebugSlot::Reference));
        sink.submit(view(DebugSlot::Candidate));

        assert_eq!(rx.try_recv().unwrap().slot, DebugSlot::Reference);
        assert!(rx.try_recv().is_err(), "second view must have been dropped");
    }

    #[tokio::test]
    async fn test_writer_task_renders_reference() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("views");
        let sink = spawn_debug_writer(target.clone()).unwrap();
        sink.submit(view(DebugSlot::Reference));

        let expected = target.join("reference_normalized.png");
        for _ in 0..100 {
            if let Ok(normalized) = image::open(&expected) {
                assert_eq!(normalized.to_rgb8().get_pixel(0, 0), &Rgb([10, 10, 200]));
                assert!(target.join("reference_crop.png").exists());
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("debug view was never written to {}", target.display());
    }
}
