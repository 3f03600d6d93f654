//! Posthoc video source worker.
//!
//! Same request-driven loop as the camera worker, bound to one video
//! file and its configured frame range; requests outside the range are
//! skipped rather than treated as errors.

use mocap_types::{SourceOutputMessage, TopicId, TopicMessage};

use crate::collaborators::FrameProcessor;
use crate::node::params::VideoNodeParams;
use crate::node::{NodeContext, NodeWorker, IDLE_WAIT};

pub struct VideoNodeWorker {
    params: VideoNodeParams,
    processor: Box<dyn FrameProcessor>,
}

impl VideoNodeWorker {
    pub fn new(params: VideoNodeParams, processor: Box<dyn FrameProcessor>) -> Self {
        Self { params, processor }
    }
}

impl NodeWorker for VideoNodeWorker {
    fn run(mut self: Box<Self>, ctx: NodeContext) {
        let (Ok(process_sub), Ok(config_sub)) = (
            ctx.subscription(TopicId::ProcessFrame),
            ctx.subscription(TopicId::ConfigUpdate),
        ) else {
            log::error!("video node '{}' missing subscriptions; exiting", ctx.node_id());
            return;
        };

        log::debug!(
            "video node '{}' running for {}",
            ctx.node_id(),
            self.params.video_path.display()
        );

        while ctx.should_run() {
            for msg in config_sub.drain() {
                if let TopicMessage::ConfigUpdate(update) = msg {
                    log::info!(
                        "video node '{}' applying config revision {}",
                        ctx.node_id(),
                        update.revision
                    );
                }
            }

            let Some(TopicMessage::ProcessFrame(request)) = process_sub.recv_timeout(IDLE_WAIT)
            else {
                continue;
            };

            if let Some(range) = self.params.frame_range {
                if !range.contains(request.frame_number) {
                    log::debug!(
                        "video node '{}' skipping frame {} outside [{}, {}]",
                        ctx.node_id(),
                        request.frame_number,
                        range.start,
                        range.end
                    );
                    continue;
                }
            }

            let observation = match self.processor.process(request.frame_number) {
                Ok(observation) => observation,
                Err(e) => {
                    log::error!(
                        "video node '{}' processor failed on frame {}: {e}",
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
                log::error!("video node '{}' publish failed: {e}", ctx.node_id());
                break;
            }
        }

        log::debug!("video node '{}' stopped", ctx.node_id());
    }
}
