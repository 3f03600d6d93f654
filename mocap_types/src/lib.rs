//! # mocap_types — pipeline core types with zero internal dependencies
//!
//! This is a leaf crate providing the canonical definitions of:
//! - [`CameraId`], [`CameraGroupId`], [`PipelineId`] — typed identifiers
//! - [`FrameNumber`], [`FrameRange`] — frame addressing
//! - [`TopicId`], [`TopicMessage`] — the pipeline's topic set and payloads
//! - [`QueuePolicy`] — explicit per-topic queue behavior
//! - [`TaskConfigs`], [`CameraConfig`], [`RecordingInfo`] — shared task
//!   and source configuration
//!
//! `mocap_core` depends on this crate for these types; nothing here
//! depends back on the core.

pub mod configs;
pub mod ids;
pub mod topics;

pub use configs::{CalibrationTaskConfig, CameraConfig, MocapTaskConfig, RecordingInfo, TaskConfigs};
pub use ids::{CameraGroupId, CameraId, FrameNumber, FrameRange, PipelineId};
pub use topics::{
    AggregationOutputMessage, CalibrationTriggerMessage, ConfigUpdateMessage, OverflowBehavior,
    Point3d, ProcessFrameMessage, QueuePolicy, SourceOutputMessage, TopicId, TopicMessage,
};
