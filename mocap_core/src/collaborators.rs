//! External collaborator interfaces.
//!
//! The core never implements frame capture, detection, or recording
//! itself; it talks to those subsystems through the traits here and
//! treats their internals as opaque.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mocap_types::{CameraGroupId, CameraId, FrameNumber, RecordingInfo};

use crate::error::{PipelineError, Result};

/// A set of live hardware cameras captured together (realtime mode).
pub trait CameraGroup: Send + Sync {
    fn id(&self) -> CameraGroupId;

    fn started(&self) -> bool;

    fn start(&self) -> Result<()>;

    fn close(&self);

    fn start_recording(&self, info: RecordingInfo) -> Result<()>;

    fn stop_recording(&self) -> Result<()>;

    /// Shared frame-buffer handle passed opaquely into nodes.
    fn frame_buffer(&self) -> Arc<dyn FrameBuffer>;
}

/// Opaque handle to the shared frame store. The core only ever asks
/// which frame landed most recently.
pub trait FrameBuffer: Send + Sync {
    fn latest_frame_number(&self) -> Option<FrameNumber>;
}

/// Per-frame payload seam for source nodes. Concrete implementations
/// run landmark/board detection on the frame; the core only routes the
/// resulting observation.
pub trait FrameProcessor: Send {
    fn process(&mut self, frame_number: FrameNumber) -> Result<Option<serde_json::Value>>;
}

/// Builds one [`FrameProcessor`] per source at launch time.
pub trait FrameProcessorFactory: Send + Sync {
    fn create(&self, source_id: &CameraId) -> Box<dyn FrameProcessor>;
}

/// Processor that observes nothing. Useful for wiring tests and for
/// pipelines that only exercise transport.
pub struct NullFrameProcessor;

impl FrameProcessor for NullFrameProcessor {
    fn process(&mut self, _frame_number: FrameNumber) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

/// Factory producing [`NullFrameProcessor`] for every source.
pub struct NullProcessorFactory;

impl FrameProcessorFactory for NullProcessorFactory {
    fn create(&self, _source_id: &CameraId) -> Box<dyn FrameProcessor> {
        Box::new(NullFrameProcessor)
    }
}

/// Discover source videos in a recording directory.
///
/// Scans `<directory>/<subfolder>` (or the directory itself when
/// `subfolder` is `None`) for files with `extension`; the camera id is
/// the file stem. Raises not-found if the directory, the subfolder, or
/// any matching file is absent.
pub fn discover_videos(
    directory: &Path,
    subfolder: Option<&str>,
    extension: &str,
) -> Result<BTreeMap<CameraId, PathBuf>> {
    if !directory.exists() {
        return Err(PipelineError::not_found(format!(
            "recording directory not found: {}",
            directory.display()
        )));
    }
    let videos_dir = match subfolder {
        Some(sub) => {
            let dir = directory.join(sub);
            if !dir.exists() {
                return Err(PipelineError::not_found(format!(
                    "video subfolder not found: {}",
                    dir.display()
                )));
            }
            dir
        }
        None => directory.to_path_buf(),
    };

    let wanted = extension.trim_start_matches('.');
    let mut videos = BTreeMap::new();
    for entry in std::fs::read_dir(&videos_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(wanted) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            videos.insert(CameraId::from(stem), path.clone());
        }
    }

    if videos.is_empty() {
        return Err(PipelineError::not_found(format!(
            "no .{} files found in {}",
            wanted,
            videos_dir.display()
        )));
    }
    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_videos_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("synchronized_videos");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("camA.mp4"), b"").unwrap();
        std::fs::write(sub.join("camB.mp4"), b"").unwrap();
        std::fs::write(sub.join("notes.txt"), b"").unwrap();

        let videos =
            discover_videos(dir.path(), Some("synchronized_videos"), ".mp4").unwrap();
        assert_eq!(videos.len(), 2);
        assert!(videos.contains_key(&CameraId::from("camA")));
        assert!(videos.contains_key(&CameraId::from("camB")));
    }

    #[test]
    fn discover_videos_missing_directory() {
        let err = discover_videos(Path::new("/nonexistent/recording"), None, "mp4").unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn discover_videos_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_videos(dir.path(), None, "mp4").unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
