//! Shared task and source configuration.
//!
//! Configuration values are immutable once constructed; "updating" a
//! running pipeline always means publishing a newly built
//! [`TaskConfigs`] value on the config-update topic.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::CameraId;

/// Charuco-board calibration task parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTaskConfig {
    /// Squares along the board's width.
    pub board_x_squares: u32,
    /// Squares along the board's height.
    pub board_y_squares: u32,
    /// Physical square edge length in millimeters.
    pub square_length_mm: f64,
    /// Use the board pose as the world ground plane.
    pub use_board_as_ground_plane: bool,
}

impl Default for CalibrationTaskConfig {
    fn default() -> Self {
        Self {
            board_x_squares: 5,
            board_y_squares: 3,
            square_length_mm: 57.0,
            use_board_as_ground_plane: true,
        }
    }
}

/// Skeleton-tracking task parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MocapTaskConfig {
    /// Tracker model identifier, e.g. "mediapipe-holistic".
    pub tracker_model: String,
    /// Minimum landmark detection confidence, 0.0..=1.0.
    pub min_detection_confidence: f64,
}

impl Default for MocapTaskConfig {
    fn default() -> Self {
        Self {
            tracker_model: "mediapipe-holistic".to_string(),
            min_detection_confidence: 0.5,
        }
    }
}

/// Task parameters shared by every node in a pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskConfigs {
    pub calibration: CalibrationTaskConfig,
    pub mocap: MocapTaskConfig,
}

/// Hardware configuration for one live camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub camera_id: CameraId,
    /// (width, height) in pixels.
    pub resolution: (u32, u32),
    pub fps: f64,
}

impl CameraConfig {
    pub fn new(camera_id: impl Into<CameraId>) -> Self {
        Self {
            camera_id: camera_id.into(),
            resolution: (1920, 1080),
            fps: 30.0,
        }
    }
}

/// Destination info for a recording started on a live camera group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub recording_name: String,
    pub output_directory: PathBuf,
}
