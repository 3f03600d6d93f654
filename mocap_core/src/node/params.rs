//! Declarative node parameters.
//!
//! Each parameter type states its fixed subscribed/published topic
//! lists up front, without requiring node construction; the launch
//! config unions them to compute the topic set the launcher must
//! pre-allocate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use mocap_types::{CameraGroupId, CameraId, FrameRange, TaskConfigs, TopicId};

/// Tagged node kind, used for start/shutdown ordering. Kind is never
/// inferred from an id string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Ingests one camera or one video file, publishes per-frame results.
    Source,
    /// Fuses all source outputs into one combined message per frame.
    Aggregation,
}

/// Parameters for a realtime camera source node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraNodeParams {
    pub camera_id: CameraId,
    pub task_configs: TaskConfigs,
}

impl CameraNodeParams {
    pub const SUBSCRIBED_TOPICS: &'static [TopicId] = &[
        TopicId::ProcessFrame,
        TopicId::ConfigUpdate,
        TopicId::CalibrationTrigger,
    ];
    pub const PUBLISHED_TOPICS: &'static [TopicId] = &[TopicId::SourceOutput];
}

/// Parameters for a posthoc video source node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoNodeParams {
    pub camera_id: CameraId,
    pub video_path: PathBuf,
    /// Inclusive range to process; `None` means the whole file.
    pub frame_range: Option<FrameRange>,
    pub task_configs: TaskConfigs,
}

impl VideoNodeParams {
    pub const SUBSCRIBED_TOPICS: &'static [TopicId] =
        &[TopicId::ProcessFrame, TopicId::ConfigUpdate];
    pub const PUBLISHED_TOPICS: &'static [TopicId] = &[TopicId::SourceOutput];
}

/// Parameters for the aggregation node (shared by both modes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationNodeParams {
    pub camera_group_id: CameraGroupId,
    /// Every active source; an output frame is complete once each of
    /// these has reported.
    pub camera_ids: Vec<CameraId>,
    pub task_configs: TaskConfigs,
}

impl AggregationNodeParams {
    pub const SUBSCRIBED_TOPICS: &'static [TopicId] = &[
        TopicId::SourceOutput,
        TopicId::ConfigUpdate,
        TopicId::CalibrationTrigger,
    ];
    pub const PUBLISHED_TOPICS: &'static [TopicId] =
        &[TopicId::ProcessFrame, TopicId::AggregationOutput];
}

/// Immutable parameter set for one node of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeParams {
    Camera(CameraNodeParams),
    Video(VideoNodeParams),
    Aggregation(AggregationNodeParams),
}

impl NodeParams {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeParams::Camera(_) | NodeParams::Video(_) => NodeKind::Source,
            NodeParams::Aggregation(_) => NodeKind::Aggregation,
        }
    }

    /// Topics this node receives on.
    pub fn subscribed_topics(&self) -> &'static [TopicId] {
        match self {
            NodeParams::Camera(_) => CameraNodeParams::SUBSCRIBED_TOPICS,
            NodeParams::Video(_) => VideoNodeParams::SUBSCRIBED_TOPICS,
            NodeParams::Aggregation(_) => AggregationNodeParams::SUBSCRIBED_TOPICS,
        }
    }

    /// Topics this node publishes to.
    pub fn published_topics(&self) -> &'static [TopicId] {
        match self {
            NodeParams::Camera(_) => CameraNodeParams::PUBLISHED_TOPICS,
            NodeParams::Video(_) => VideoNodeParams::PUBLISHED_TOPICS,
            NodeParams::Aggregation(_) => AggregationNodeParams::PUBLISHED_TOPICS,
        }
    }

    pub fn task_configs(&self) -> &TaskConfigs {
        match self {
            NodeParams::Camera(p) => &p.task_configs,
            NodeParams::Video(p) => &p.task_configs,
            NodeParams::Aggregation(p) => &p.task_configs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_comes_from_the_tag() {
        let camera = NodeParams::Camera(CameraNodeParams {
            camera_id: "cam0".into(),
            task_configs: TaskConfigs::default(),
        });
        assert_eq!(camera.kind(), NodeKind::Source);

        let agg = NodeParams::Aggregation(AggregationNodeParams {
            camera_group_id: "g1".into(),
            camera_ids: vec!["cam0".into()],
            task_configs: TaskConfigs::default(),
        });
        assert_eq!(agg.kind(), NodeKind::Aggregation);
    }

    #[test]
    fn topic_lists_available_without_construction() {
        let video = NodeParams::Video(VideoNodeParams {
            camera_id: "camA".into(),
            video_path: "/tmp/a.mp4".into(),
            frame_range: None,
            task_configs: TaskConfigs::default(),
        });
        assert!(video.subscribed_topics().contains(&TopicId::ProcessFrame));
        assert_eq!(video.published_topics(), &[TopicId::SourceOutput]);
    }
}
