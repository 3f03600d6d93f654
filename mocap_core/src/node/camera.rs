//! Realtime camera source worker.
//!
//! Consumes "process frame N" requests, runs the frame through the
//! per-source processor, and publishes one `SourceOutput` per
//! processed frame. Failures stay inside the worker: the loop logs and
//! exits, surfacing only through the node's liveness probe.

use std::sync::Arc;

use mocap_types::{SourceOutputMessage, TopicId, TopicMessage};

use crate::collaborators::{FrameBuffer, FrameProcessor};
use crate::node::params::CameraNodeParams;
use crate::node::{NodeContext, NodeWorker, IDLE_WAIT};

pub struct CameraNodeWorker {
    params: CameraNodeParams,
    processor: Box<dyn FrameProcessor>,
    /// Opaque shared frame store; used only to sanity-check requests.
    frame_buffer: Arc<dyn FrameBuffer>,
}

impl CameraNodeWorker {
    pub fn new(
        params: CameraNodeParams,
        processor: Box<dyn FrameProcessor>,
        frame_buffer: Arc<dyn FrameBuffer>,
    ) -> Self {
        Self {
            params,
            processor,
            frame_buffer,
        }
    }
}

impl NodeWorker for CameraNodeWorker {
    fn run(mut self: Box<Self>, ctx: NodeContext) {
        let (Ok(process_sub), Ok(config_sub), Ok(calibration_sub)) = (
            ctx.subscription(TopicId::ProcessFrame),
            ctx.subscription(TopicId::ConfigUpdate),
            ctx.subscription(TopicId::CalibrationTrigger),
        ) else {
            log::error!("camera node '{}' missing subscriptions; exiting", ctx.node_id());
            return;
        };

        log::debug!(
            "camera node '{}' running for camera {}",
            ctx.node_id(),
            self.params.camera_id
        );
        let mut task_configs = self.params.task_configs.clone();

        while ctx.should_run() {
            // Config updates apply before the next processed frame.
            for msg in config_sub.drain() {
                if let TopicMessage::ConfigUpdate(update) = msg {
                    log::info!(
                        "camera node '{}' applying config revision {}",
                        ctx.node_id(),
                        update.revision
                    );
                    task_configs = update.task_configs;
                }
            }
            for _ in calibration_sub.drain() {
                log::debug!(
                    "camera node '{}' observed calibration trigger (board: {}x{})",
                    ctx.node_id(),
                    task_configs.calibration.board_x_squares,
                    task_configs.calibration.board_y_squares
                );
            }

            let Some(TopicMessage::ProcessFrame(request)) = process_sub.recv_timeout(IDLE_WAIT)
            else {
                continue;
            };

            if let Some(latest) = self.frame_buffer.latest_frame_number() {
                if request.frame_number > latest {
                    log::warn!(
                        "camera node '{}' asked for frame {} but buffer is at {}; skipping",
                        ctx.node_id(),
                        request.frame_number,
                        latest
                    );
                    continue;
                }
            }

            let observation = match self.processor.process(request.frame_number) {
                Ok(observation) => observation,
                Err(e) => {
                    log::error!(
                        "camera node '{}' processor failed on frame {}: {e}",
                        ctx.node_id(),
                        request.frame_number
                    );
                    break;
                }
            };

            let output = SourceOutputMessage {
                source_id: self.params.camera_id.clone(),
                frame_number: request.frame_number,
                observation,
            };
            if let Err(e) = ctx.publish(TopicId::SourceOutput, output) {
                log::error!("camera node '{}' publish failed: {e}", ctx.node_id());
                break;
            }
        }

        log::debug!("camera node '{}' stopped", ctx.node_id());
    }
}
