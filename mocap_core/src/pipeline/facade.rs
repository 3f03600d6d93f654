//! Mode-specific pipeline handles.
//!
//! A facade wraps a launched [`PipelineInstance`] with the operations
//! that make sense for its mode, and is the only surface external
//! callers touch. Control always travels over topics; a facade never
//! reaches into a node.

use std::sync::Arc;
use std::time::Duration;

use mocap_types::{
    AggregationOutputMessage, CalibrationTriggerMessage, ConfigUpdateMessage, FrameNumber,
    PipelineId, ProcessFrameMessage, RecordingInfo, TopicId, TopicMessage,
};

use crate::collaborators::CameraGroup;
use crate::error::{PipelineError, Result};
use crate::pipeline::instance::PipelineInstance;
use crate::pipeline::launch_config::PipelineLaunchConfig;
use crate::pubsub::Subscription;

/// Drain a subscription into just its combined-output payloads.
fn drain_outputs(subscription: &Subscription) -> Vec<AggregationOutputMessage> {
    subscription
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            TopicMessage::AggregationOutput(output) => Some(output),
            _ => None,
        })
        .collect()
}

fn publish_config_update(
    instance: &mut PipelineInstance,
    new: PipelineLaunchConfig,
) -> Result<()> {
    if new.mode() != instance.config().mode() {
        return Err(PipelineError::invalid_input(format!(
            "config variant {:?} does not match running pipeline variant {:?}",
            new.mode(),
            instance.config().mode()
        )));
    }
    let revision = instance.next_config_revision();
    log::info!(
        "publishing config revision {revision} to pipeline {}",
        instance.pipeline_id()
    );
    instance.publish(
        TopicId::ConfigUpdate,
        ConfigUpdateMessage {
            revision,
            task_configs: new.task_configs().clone(),
        },
    )?;
    instance.set_config(new);
    Ok(())
}

/// Handle to a running realtime pipeline bound to a live camera group.
pub struct RealtimePipeline {
    instance: PipelineInstance,
    camera_group: Arc<dyn CameraGroup>,
    output: Subscription,
    running: bool,
}

impl RealtimePipeline {
    pub fn new(
        mut instance: PipelineInstance,
        camera_group: Arc<dyn CameraGroup>,
    ) -> Result<Self> {
        let output = instance.take_output_subscription().ok_or_else(|| {
            PipelineError::launch("pipeline instance is missing its output subscription")
        })?;
        Ok(Self {
            instance,
            camera_group,
            output,
            running: false,
        })
    }

    pub fn pipeline_id(&self) -> &PipelineId {
        self.instance.pipeline_id()
    }

    pub fn config(&self) -> &PipelineLaunchConfig {
        self.instance.config()
    }

    pub fn instance(&self) -> &PipelineInstance {
        &self.instance
    }

    /// Running means started and every node still alive.
    pub fn is_running(&self) -> bool {
        self.running && self.instance.is_alive()
    }

    /// Start frame flow: bring the camera group up. No-op when
    /// already running.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            log::info!("pipeline {} already started; ignoring", self.pipeline_id());
            return Ok(());
        }
        if !self.camera_group.started() {
            self.camera_group.start()?;
        }
        self.running = true;
        log::info!("realtime pipeline {} started", self.pipeline_id());
        Ok(())
    }

    /// Stop frame flow without tearing the pipeline down. No-op when
    /// not running.
    pub fn stop(&mut self) {
        if !self.running {
            log::info!("pipeline {} already stopped; ignoring", self.pipeline_id());
            return;
        }
        self.camera_group.close();
        self.running = false;
        log::info!("realtime pipeline {} stopped", self.pipeline_id());
    }

    pub fn start_recording(&self, info: RecordingInfo) -> Result<()> {
        self.require_running("start_recording")?;
        self.camera_group.start_recording(info)
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.require_running("stop_recording")?;
        self.camera_group.stop_recording()
    }

    /// Ask the pipeline to run its calibration task. Travels as a
    /// published control message.
    pub fn start_calibration(&self) -> Result<()> {
        self.require_running("start_calibration")?;
        self.instance
            .publish(TopicId::CalibrationTrigger, CalibrationTriggerMessage)
    }

    /// Swap in a new configuration without restarting nodes. The new
    /// config must be the same variant as the running one.
    pub fn update_config(&mut self, new: PipelineLaunchConfig) -> Result<()> {
        self.require_running("update_config")?;
        publish_config_update(&mut self.instance, new)
    }

    /// Combined outputs that have arrived since the last call.
    pub fn drain_outputs(&self) -> Vec<AggregationOutputMessage> {
        drain_outputs(&self.output)
    }

    /// Block up to `timeout` for the next combined output.
    pub fn next_output(&self, timeout: Duration) -> Option<AggregationOutputMessage> {
        match self.output.recv_timeout(timeout) {
            Some(TopicMessage::AggregationOutput(output)) => Some(output),
            _ => None,
        }
    }

    /// Tear the whole pipeline down. Idempotent.
    pub fn shutdown(&mut self) {
        if self.running {
            self.camera_group.close();
            self.running = false;
        }
        self.instance.shutdown();
    }

    fn require_running(&self, operation: &str) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(PipelineError::invalid_input(format!(
                "{operation} requires a running pipeline"
            )))
        }
    }
}

/// Handle to a posthoc pipeline processing recorded videos in batches.
pub struct PosthocPipeline {
    instance: PipelineInstance,
    output: Subscription,
    running: bool,
    frames_requested: u64,
    frames_processed: u64,
}

impl PosthocPipeline {
    pub fn new(mut instance: PipelineInstance) -> Result<Self> {
        let output = instance.take_output_subscription().ok_or_else(|| {
            PipelineError::launch("pipeline instance is missing its output subscription")
        })?;
        Ok(Self {
            instance,
            output,
            running: false,
            frames_requested: 0,
            frames_processed: 0,
        })
    }

    pub fn pipeline_id(&self) -> &PipelineId {
        self.instance.pipeline_id()
    }

    pub fn config(&self) -> &PipelineLaunchConfig {
        self.instance.config()
    }

    pub fn instance(&self) -> &PipelineInstance {
        &self.instance
    }

    pub fn is_running(&self) -> bool {
        self.running && self.instance.is_alive()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running {
            log::info!("pipeline {} already started; ignoring", self.pipeline_id());
            return Ok(());
        }
        self.running = true;
        log::info!("posthoc pipeline {} started", self.pipeline_id());
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.running {
            log::info!("pipeline {} already stopped; ignoring", self.pipeline_id());
            return;
        }
        self.running = false;
        log::info!("posthoc pipeline {} stopped", self.pipeline_id());
    }

    /// Request processing of the inclusive frame range `[start, end]`,
    /// one control message per `step`, ascending.
    pub fn process_batch(
        &mut self,
        start_frame: FrameNumber,
        end_frame: FrameNumber,
        step: u64,
    ) -> Result<()> {
        self.require_running("process_batch")?;
        if step == 0 {
            return Err(PipelineError::invalid_input("batch step must be nonzero"));
        }
        if end_frame < start_frame {
            return Err(PipelineError::invalid_input(format!(
                "batch range [{start_frame}, {end_frame}] is reversed"
            )));
        }
        let mut frame_number = start_frame;
        loop {
            self.instance
                .publish(TopicId::ProcessFrame, ProcessFrameMessage { frame_number })?;
            self.frames_requested += 1;
            match frame_number.checked_add(step) {
                Some(next) if next <= end_frame => frame_number = next,
                _ => break,
            }
        }
        log::debug!(
            "pipeline {} batch requested: frames {start_frame}..={end_frame} step {step}",
            self.pipeline_id()
        );
        Ok(())
    }

    /// `(processed, requested)` frame counts. Processed is advanced by
    /// draining the combined-output topic.
    pub fn get_progress(&mut self) -> (u64, u64) {
        self.frames_processed += drain_outputs(&self.output).len() as u64;
        (self.frames_processed, self.frames_requested)
    }

    /// Block up to `timeout` for the next combined output. Counts
    /// toward progress.
    pub fn next_output(&mut self, timeout: Duration) -> Option<AggregationOutputMessage> {
        match self.output.recv_timeout(timeout) {
            Some(TopicMessage::AggregationOutput(output)) => {
                self.frames_processed += 1;
                Some(output)
            }
            _ => None,
        }
    }

    pub fn update_config(&mut self, new: PipelineLaunchConfig) -> Result<()> {
        self.require_running("update_config")?;
        publish_config_update(&mut self.instance, new)
    }

    pub fn shutdown(&mut self) {
        self.running = false;
        self.instance.shutdown();
    }

    fn require_running(&self, operation: &str) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(PipelineError::invalid_input(format!(
                "{operation} requires a running pipeline"
            )))
        }
    }
}
