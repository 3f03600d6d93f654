//! The pipeline's topic set and message payloads.
//!
//! Each [`TopicId`] carries exactly one [`TopicMessage`] variant; the
//! registry rejects a publish whose payload does not match its topic.
//! Queue behavior on overflow is explicit configuration
//! ([`QueuePolicy`]), never an accident of the transport.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::configs::TaskConfigs;
use crate::ids::{CameraGroupId, CameraId, FrameNumber, PipelineId};

/// Every topic the pipeline core routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TopicId {
    /// Per-source, per-frame results published by camera/video nodes.
    SourceOutput,
    /// One combined, frame-numbered message per processed frame.
    AggregationOutput,
    /// Control: "process frame N" requests consumed by source nodes.
    ProcessFrame,
    /// Control: a newly constructed task configuration.
    ConfigUpdate,
    /// Control: start the calibration task.
    CalibrationTrigger,
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopicId::SourceOutput => "source-output",
            TopicId::AggregationOutput => "aggregation-output",
            TopicId::ProcessFrame => "process-frame",
            TopicId::ConfigUpdate => "config-update",
            TopicId::CalibrationTrigger => "calibration-trigger",
        };
        f.write_str(name)
    }
}

/// Behavior when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowBehavior {
    /// Discard the oldest queued message to make room (publisher never blocks).
    #[default]
    DropOldest,
    /// Discard the new message (publisher never blocks, subscriber keeps backlog).
    DropNewest,
}

/// Explicit queue policy for one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePolicy {
    /// Per-subscription queue capacity.
    pub capacity: usize,
    pub on_full: OverflowBehavior,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            capacity: 256,
            on_full: OverflowBehavior::DropOldest,
        }
    }
}

impl QueuePolicy {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

/// A tracked 3-D point in the capture volume.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Per-source, per-frame result. The observation payload is opaque to
/// the core; concrete trackers define its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOutputMessage {
    pub source_id: CameraId,
    pub frame_number: FrameNumber,
    pub observation: Option<serde_json::Value>,
}

/// The combined output for one frame, carrying every active source's
/// result. External consumers read only this topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationOutputMessage {
    pub frame_number: FrameNumber,
    pub pipeline_id: PipelineId,
    pub camera_group_id: CameraGroupId,
    /// Revision of the task configuration that produced this frame.
    pub config_revision: u64,
    pub source_outputs: BTreeMap<CameraId, SourceOutputMessage>,
    pub points3d: BTreeMap<String, Point3d>,
}

/// Request to process one frame number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFrameMessage {
    pub frame_number: FrameNumber,
}

/// A newly constructed task configuration, picked up by nodes
/// asynchronously before their next processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdateMessage {
    pub revision: u64,
    pub task_configs: TaskConfigs,
}

/// Signal that the calibration task should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalibrationTriggerMessage;

/// One message on one topic. The variant determines the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TopicMessage {
    SourceOutput(SourceOutputMessage),
    AggregationOutput(AggregationOutputMessage),
    ProcessFrame(ProcessFrameMessage),
    ConfigUpdate(ConfigUpdateMessage),
    CalibrationTrigger(CalibrationTriggerMessage),
}

impl TopicMessage {
    /// The topic this payload belongs on.
    pub fn topic(&self) -> TopicId {
        match self {
            TopicMessage::SourceOutput(_) => TopicId::SourceOutput,
            TopicMessage::AggregationOutput(_) => TopicId::AggregationOutput,
            TopicMessage::ProcessFrame(_) => TopicId::ProcessFrame,
            TopicMessage::ConfigUpdate(_) => TopicId::ConfigUpdate,
            TopicMessage::CalibrationTrigger(_) => TopicId::CalibrationTrigger,
        }
    }
}

impl From<SourceOutputMessage> for TopicMessage {
    fn from(msg: SourceOutputMessage) -> Self {
        TopicMessage::SourceOutput(msg)
    }
}

impl From<AggregationOutputMessage> for TopicMessage {
    fn from(msg: AggregationOutputMessage) -> Self {
        TopicMessage::AggregationOutput(msg)
    }
}

impl From<ProcessFrameMessage> for TopicMessage {
    fn from(msg: ProcessFrameMessage) -> Self {
        TopicMessage::ProcessFrame(msg)
    }
}

impl From<ConfigUpdateMessage> for TopicMessage {
    fn from(msg: ConfigUpdateMessage) -> Self {
        TopicMessage::ConfigUpdate(msg)
    }
}

impl From<CalibrationTriggerMessage> for TopicMessage {
    fn from(msg: CalibrationTriggerMessage) -> Self {
        TopicMessage::CalibrationTrigger(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_reports_its_topic() {
        let msg = TopicMessage::from(ProcessFrameMessage { frame_number: 7 });
        assert_eq!(msg.topic(), TopicId::ProcessFrame);

        let msg = TopicMessage::from(CalibrationTriggerMessage);
        assert_eq!(msg.topic(), TopicId::CalibrationTrigger);
    }

    #[test]
    fn queue_policy_default_is_bounded_drop_oldest() {
        let policy = QueuePolicy::default();
        assert_eq!(policy.capacity, 256);
        assert_eq!(policy.on_full, OverflowBehavior::DropOldest);
    }

    #[test]
    fn aggregation_output_serde_roundtrip() {
        let mut source_outputs = BTreeMap::new();
        source_outputs.insert(
            CameraId::from("cam0"),
            SourceOutputMessage {
                source_id: CameraId::from("cam0"),
                frame_number: 3,
                observation: Some(serde_json::json!({"landmarks": [1.0, 2.0]})),
            },
        );
        let msg = AggregationOutputMessage {
            frame_number: 3,
            pipeline_id: PipelineId::from("abc123"),
            camera_group_id: CameraGroupId::from("g1"),
            config_revision: 1,
            source_outputs,
            points3d: BTreeMap::new(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: AggregationOutputMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
