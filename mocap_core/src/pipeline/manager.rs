//! Tracks every running pipeline behind one lock, so callers create,
//! look up, and close pipelines by id without holding handles
//! themselves.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use mocap_types::{CameraGroupId, CameraId, PipelineId, TaskConfigs};

use crate::collaborators::{CameraGroup, FrameProcessorFactory};
use crate::error::{PipelineError, Result};
use crate::pipeline::facade::{PosthocPipeline, RealtimePipeline};
use crate::pipeline::launch_config::{
    PipelineLaunchConfig, PipelineMode, PosthocLaunchConfig, RealtimeLaunchConfig,
};
use crate::pipeline::launcher::PipelineLauncher;

/// Either facade, uniformly managed.
pub enum ManagedPipeline {
    Realtime(RealtimePipeline),
    Posthoc(PosthocPipeline),
}

impl ManagedPipeline {
    pub fn pipeline_id(&self) -> &PipelineId {
        match self {
            ManagedPipeline::Realtime(p) => p.pipeline_id(),
            ManagedPipeline::Posthoc(p) => p.pipeline_id(),
        }
    }

    pub fn config(&self) -> &PipelineLaunchConfig {
        match self {
            ManagedPipeline::Realtime(p) => p.config(),
            ManagedPipeline::Posthoc(p) => p.config(),
        }
    }

    pub fn mode(&self) -> PipelineMode {
        self.config().mode()
    }

    pub fn is_running(&self) -> bool {
        match self {
            ManagedPipeline::Realtime(p) => p.is_running(),
            ManagedPipeline::Posthoc(p) => p.is_running(),
        }
    }

    pub fn shutdown(&mut self) {
        match self {
            ManagedPipeline::Realtime(p) => p.shutdown(),
            ManagedPipeline::Posthoc(p) => p.shutdown(),
        }
    }

    pub fn as_realtime(&mut self) -> Option<&mut RealtimePipeline> {
        match self {
            ManagedPipeline::Realtime(p) => Some(p),
            ManagedPipeline::Posthoc(_) => None,
        }
    }

    pub fn as_posthoc(&mut self) -> Option<&mut PosthocPipeline> {
        match self {
            ManagedPipeline::Realtime(_) => None,
            ManagedPipeline::Posthoc(p) => Some(p),
        }
    }
}

/// Point-in-time summary of one managed pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub mode: PipelineMode,
    pub camera_group_id: CameraGroupId,
    pub camera_ids: Vec<CameraId>,
    pub running: bool,
}

type PipelineHandle = Arc<Mutex<ManagedPipeline>>;

pub struct PipelineManager {
    launcher: PipelineLauncher,
    pipelines: Mutex<HashMap<PipelineId, PipelineHandle>>,
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineManager {
    pub fn new() -> Self {
        Self {
            launcher: PipelineLauncher::new(),
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Launch and start a realtime pipeline for `camera_group`. If a
    /// running realtime pipeline with the same camera set already
    /// exists, it is reused instead of launching a duplicate.
    pub fn create_realtime_pipeline(
        &self,
        config: RealtimeLaunchConfig,
        camera_group: Arc<dyn CameraGroup>,
        processor_factory: &dyn FrameProcessorFactory,
    ) -> Result<PipelineId> {
        if let Some(existing) = self.find_matching_realtime(&config) {
            log::info!(
                "reusing running realtime pipeline {existing} for group {}",
                config.camera_group_id
            );
            return Ok(existing);
        }

        let launch_config = PipelineLaunchConfig::Realtime(config);
        let instance =
            self.launcher
                .launch(launch_config, Some(Arc::clone(&camera_group)), processor_factory)?;
        let mut pipeline = RealtimePipeline::new(instance, camera_group)?;
        pipeline.start()?;

        let pipeline_id = pipeline.pipeline_id().clone();
        self.pipelines.lock().insert(
            pipeline_id.clone(),
            Arc::new(Mutex::new(ManagedPipeline::Realtime(pipeline))),
        );
        Ok(pipeline_id)
    }

    /// Launch and start a posthoc pipeline by scanning a recording
    /// directory for videos.
    pub fn create_posthoc_pipeline(
        &self,
        recording_path: impl Into<std::path::PathBuf>,
        video_subfolder: Option<&str>,
        video_extension: &str,
        task_configs: TaskConfigs,
        processor_factory: &dyn FrameProcessorFactory,
    ) -> Result<PipelineId> {
        let config = PosthocLaunchConfig::from_recording_directory(
            recording_path,
            video_subfolder,
            video_extension,
            task_configs,
            None,
        )?;
        let instance =
            self.launcher
                .launch(PipelineLaunchConfig::Posthoc(config), None, processor_factory)?;
        let mut pipeline = PosthocPipeline::new(instance)?;
        pipeline.start()?;

        let pipeline_id = pipeline.pipeline_id().clone();
        self.pipelines.lock().insert(
            pipeline_id.clone(),
            Arc::new(Mutex::new(ManagedPipeline::Posthoc(pipeline))),
        );
        Ok(pipeline_id)
    }

    pub fn get_pipeline(&self, pipeline_id: &PipelineId) -> Option<PipelineHandle> {
        self.pipelines.lock().get(pipeline_id).cloned()
    }

    /// Shut down and forget one pipeline.
    pub fn close_pipeline(&self, pipeline_id: &PipelineId) -> Result<()> {
        let handle = self.pipelines.lock().remove(pipeline_id).ok_or_else(|| {
            PipelineError::not_found(format!("no pipeline with id {pipeline_id}"))
        })?;
        handle.lock().shutdown();
        Ok(())
    }

    /// Shut down everything this manager tracks.
    pub fn close_all(&self) {
        let handles: Vec<PipelineHandle> = self.pipelines.lock().drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.lock().shutdown();
        }
        if !handles.is_empty() {
            log::info!("closed {} pipelines", handles.len());
        }
    }

    pub fn pipeline_states(&self) -> BTreeMap<PipelineId, PipelineState> {
        let handles: Vec<(PipelineId, PipelineHandle)> = self
            .pipelines
            .lock()
            .iter()
            .map(|(id, h)| (id.clone(), Arc::clone(h)))
            .collect();
        handles
            .into_iter()
            .map(|(id, handle)| {
                let pipeline = handle.lock();
                let config = pipeline.config();
                let state = PipelineState {
                    mode: config.mode(),
                    camera_group_id: config.camera_group_id().clone(),
                    camera_ids: config.camera_ids(),
                    running: pipeline.is_running(),
                };
                (id, state)
            })
            .collect()
    }

    fn find_matching_realtime(&self, config: &RealtimeLaunchConfig) -> Option<PipelineId> {
        let wanted: Vec<CameraId> = config.camera_ids();
        let handles: Vec<(PipelineId, PipelineHandle)> = self
            .pipelines
            .lock()
            .iter()
            .map(|(id, h)| (id.clone(), Arc::clone(h)))
            .collect();
        for (id, handle) in handles {
            let pipeline = handle.lock();
            if pipeline.mode() == PipelineMode::Realtime
                && pipeline.is_running()
                && pipeline.config().camera_ids() == wanted
            {
                return Some(id);
            }
        }
        None
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        self.close_all();
    }
}
