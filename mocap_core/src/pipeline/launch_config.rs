//! Immutable launch configurations.
//!
//! A pipeline is launched from exactly one of two variants: realtime
//! (live cameras) or posthoc (recorded video files). The enum makes a
//! mixed pipeline unrepresentable. Once built, a config is never
//! mutated; runtime config changes travel as published updates.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mocap_types::{CameraConfig, CameraGroupId, CameraId, FrameRange, TaskConfigs, TopicId};

use crate::collaborators::discover_videos;
use crate::error::{PipelineError, Result};
use crate::node::{
    AggregationNodeParams, CameraNodeParams, NodeId, NodeParams, VideoNodeParams,
};

/// Which kind of pipeline a config describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineMode {
    Realtime,
    Posthoc,
}

/// Launch configuration for a live camera-group pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeLaunchConfig {
    pub camera_group_id: CameraGroupId,
    pub camera_configs: BTreeMap<CameraId, CameraConfig>,
    pub task_configs: TaskConfigs,
}

impl RealtimeLaunchConfig {
    pub fn create(
        camera_group_id: CameraGroupId,
        camera_configs: impl IntoIterator<Item = CameraConfig>,
        task_configs: TaskConfigs,
    ) -> Result<Self> {
        let mut configs = BTreeMap::new();
        for config in camera_configs {
            if configs.insert(config.camera_id.clone(), config).is_some() {
                return Err(PipelineError::config(
                    "duplicate camera id in realtime launch config",
                ));
            }
        }
        if configs.is_empty() {
            return Err(PipelineError::config(
                "realtime launch config requires at least one camera",
            ));
        }
        Ok(Self {
            camera_group_id,
            camera_configs: configs,
            task_configs,
        })
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.camera_configs.keys().cloned().collect()
    }

    fn source_node_params(&self) -> Vec<NodeParams> {
        self.camera_configs
            .keys()
            .map(|camera_id| {
                NodeParams::Camera(CameraNodeParams {
                    camera_id: camera_id.clone(),
                    task_configs: self.task_configs.clone(),
                })
            })
            .collect()
    }
}

/// Launch configuration for an offline pipeline over recorded videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosthocLaunchConfig {
    pub recording_path: PathBuf,
    pub camera_group_id: CameraGroupId,
    pub video_paths: BTreeMap<CameraId, PathBuf>,
    /// Inclusive range to process; `None` means every frame.
    pub frame_range: Option<FrameRange>,
    pub task_configs: TaskConfigs,
}

impl PosthocLaunchConfig {
    pub fn create(
        recording_path: impl Into<PathBuf>,
        video_paths: BTreeMap<CameraId, PathBuf>,
        task_configs: TaskConfigs,
        frame_range: Option<FrameRange>,
    ) -> Result<Self> {
        let recording_path = recording_path.into();
        if !recording_path.exists() {
            return Err(PipelineError::not_found(format!(
                "recording directory not found: {}",
                recording_path.display()
            )));
        }
        if video_paths.is_empty() {
            return Err(PipelineError::config(
                "posthoc launch config requires at least one video",
            ));
        }
        for (camera_id, path) in &video_paths {
            if !path.exists() {
                return Err(PipelineError::not_found(format!(
                    "video for camera '{camera_id}' not found: {}",
                    path.display()
                )));
            }
        }
        Ok(Self {
            camera_group_id: group_id_from_directory(&recording_path),
            recording_path,
            video_paths,
            frame_range,
            task_configs,
        })
    }

    /// Build a config by scanning a recording directory for videos.
    /// The camera id is each file's stem.
    pub fn from_recording_directory(
        recording_path: impl Into<PathBuf>,
        video_subfolder: Option<&str>,
        video_extension: &str,
        task_configs: TaskConfigs,
        frame_range: Option<FrameRange>,
    ) -> Result<Self> {
        let recording_path = recording_path.into();
        let video_paths = discover_videos(&recording_path, video_subfolder, video_extension)?;
        Self::create(recording_path, video_paths, task_configs, frame_range)
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.video_paths.keys().cloned().collect()
    }

    fn source_node_params(&self) -> Vec<NodeParams> {
        self.video_paths
            .iter()
            .map(|(camera_id, video_path)| {
                NodeParams::Video(VideoNodeParams {
                    camera_id: camera_id.clone(),
                    video_path: video_path.clone(),
                    frame_range: self.frame_range,
                    task_configs: self.task_configs.clone(),
                })
            })
            .collect()
    }
}

fn group_id_from_directory(path: &Path) -> CameraGroupId {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(CameraGroupId::from)
        .unwrap_or_else(|| CameraGroupId::from("recording"))
}

/// One pipeline launch request, realtime or posthoc. Never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineLaunchConfig {
    Realtime(RealtimeLaunchConfig),
    Posthoc(PosthocLaunchConfig),
}

impl PipelineLaunchConfig {
    pub fn mode(&self) -> PipelineMode {
        match self {
            PipelineLaunchConfig::Realtime(_) => PipelineMode::Realtime,
            PipelineLaunchConfig::Posthoc(_) => PipelineMode::Posthoc,
        }
    }

    pub fn camera_group_id(&self) -> &CameraGroupId {
        match self {
            PipelineLaunchConfig::Realtime(c) => &c.camera_group_id,
            PipelineLaunchConfig::Posthoc(c) => &c.camera_group_id,
        }
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        match self {
            PipelineLaunchConfig::Realtime(c) => c.camera_ids(),
            PipelineLaunchConfig::Posthoc(c) => c.camera_ids(),
        }
    }

    pub fn task_configs(&self) -> &TaskConfigs {
        match self {
            PipelineLaunchConfig::Realtime(c) => &c.task_configs,
            PipelineLaunchConfig::Posthoc(c) => &c.task_configs,
        }
    }

    pub fn source_node_params(&self) -> Vec<NodeParams> {
        match self {
            PipelineLaunchConfig::Realtime(c) => c.source_node_params(),
            PipelineLaunchConfig::Posthoc(c) => c.source_node_params(),
        }
    }

    pub fn aggregation_node_params(&self) -> NodeParams {
        NodeParams::Aggregation(AggregationNodeParams {
            camera_group_id: self.camera_group_id().clone(),
            camera_ids: self.camera_ids(),
            task_configs: self.task_configs().clone(),
        })
    }

    /// Every node the launcher must construct, sources first and the
    /// aggregation node last.
    pub fn get_all_node_params(&self) -> Vec<(NodeId, NodeParams)> {
        let mut all: Vec<(NodeId, NodeParams)> = self
            .source_node_params()
            .into_iter()
            .map(|params| (source_node_id(self.mode(), &params), params))
            .collect();
        let aggregation = self.aggregation_node_params();
        all.push((
            NodeId::new(format!("aggregation-{}", self.camera_group_id())),
            aggregation,
        ));
        all
    }

    /// Union of every node's subscribed and published topics; the
    /// registry this launch needs, and nothing else.
    pub fn get_required_topics(&self) -> BTreeSet<TopicId> {
        let mut topics = BTreeSet::new();
        for (_, params) in self.get_all_node_params() {
            topics.extend(params.subscribed_topics().iter().copied());
            topics.extend(params.published_topics().iter().copied());
        }
        topics
    }
}

fn source_node_id(mode: PipelineMode, params: &NodeParams) -> NodeId {
    let camera_id = match params {
        NodeParams::Camera(p) => &p.camera_id,
        NodeParams::Video(p) => &p.camera_id,
        NodeParams::Aggregation(_) => unreachable!("aggregation params in source list"),
    };
    match mode {
        PipelineMode::Realtime => NodeId::new(format!("camera-{camera_id}")),
        PipelineMode::Posthoc => NodeId::new(format!("video-{camera_id}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_config(id: &str) -> CameraConfig {
        CameraConfig::new(id)
    }

    #[test]
    fn realtime_config_rejects_empty_camera_set() {
        let err =
            RealtimeLaunchConfig::create("g1".into(), Vec::new(), TaskConfigs::default())
                .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn realtime_config_rejects_duplicate_cameras() {
        let err = RealtimeLaunchConfig::create(
            "g1".into(),
            [camera_config("cam0"), camera_config("cam0")],
            TaskConfigs::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn node_params_cover_every_camera_plus_aggregation() {
        let config = PipelineLaunchConfig::Realtime(
            RealtimeLaunchConfig::create(
                "g1".into(),
                [camera_config("cam0"), camera_config("cam1")],
                TaskConfigs::default(),
            )
            .unwrap(),
        );
        let all = config.get_all_node_params();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].0, NodeId::from("camera-cam0"));
        assert_eq!(all[1].0, NodeId::from("camera-cam1"));
        assert_eq!(all[2].0, NodeId::from("aggregation-g1"));
        assert!(matches!(all[2].1, NodeParams::Aggregation(_)));
    }

    #[test]
    fn required_topics_are_the_union_of_node_topics() {
        let config = PipelineLaunchConfig::Realtime(
            RealtimeLaunchConfig::create(
                "g1".into(),
                [camera_config("cam0")],
                TaskConfigs::default(),
            )
            .unwrap(),
        );
        let topics = config.get_required_topics();
        for topic in [
            TopicId::ProcessFrame,
            TopicId::ConfigUpdate,
            TopicId::CalibrationTrigger,
            TopicId::SourceOutput,
            TopicId::AggregationOutput,
        ] {
            assert!(topics.contains(&topic), "missing {topic}");
        }
    }

    #[test]
    fn posthoc_config_validates_every_video_path() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("camA.mp4");
        std::fs::write(&present, b"").unwrap();

        let mut paths = BTreeMap::new();
        paths.insert(CameraId::from("camA"), present);
        paths.insert(CameraId::from("camB"), dir.path().join("camB.mp4"));

        let err = PosthocLaunchConfig::create(dir.path(), paths, TaskConfigs::default(), None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn posthoc_discovery_derives_group_and_camera_ids() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("session_2024");
        let videos = recording.join("synchronized_videos");
        std::fs::create_dir_all(&videos).unwrap();
        std::fs::write(videos.join("camA.mp4"), b"").unwrap();
        std::fs::write(videos.join("camB.mp4"), b"").unwrap();

        let config = PosthocLaunchConfig::from_recording_directory(
            &recording,
            Some("synchronized_videos"),
            "mp4",
            TaskConfigs::default(),
            None,
        )
        .unwrap();
        assert_eq!(config.camera_group_id, CameraGroupId::from("session_2024"));
        assert_eq!(
            config.camera_ids(),
            vec![CameraId::from("camA"), CameraId::from("camB")]
        );
    }

    #[test]
    fn mixed_mode_is_unrepresentable_by_type() {
        // One enum variant per mode; constructing a config fixes the
        // mode for the pipeline's whole lifetime.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("camA.mp4"), b"").unwrap();
        let config = PipelineLaunchConfig::Posthoc(
            PosthocLaunchConfig::from_recording_directory(
                dir.path(),
                None,
                "mp4",
                TaskConfigs::default(),
                None,
            )
            .unwrap(),
        );
        assert_eq!(config.mode(), PipelineMode::Posthoc);
    }
}
