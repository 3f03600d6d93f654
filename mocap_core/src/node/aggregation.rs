//! Aggregation worker: fuses every source's per-frame output into one
//! combined, frame-numbered message.
//!
//! Cross-source ordering is this node's problem by contract: source
//! outputs arrive in any order and are collected into a frame-keyed
//! pending map; a frame is emitted exactly once, when every active
//! source has reported it. In realtime mode the worker also paces the
//! pipeline by publishing a frame request whenever the shared buffer
//! advances and the previous request has completed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mocap_types::{
    AggregationOutputMessage, CameraId, FrameNumber, PipelineId, ProcessFrameMessage,
    SourceOutputMessage, TopicId, TopicMessage,
};

use crate::collaborators::FrameBuffer;
use crate::node::params::AggregationNodeParams;
use crate::node::{NodeContext, NodeWorker};

/// Emitted-frame memory: enough to reject stale duplicates without
/// growing without bound on long runs.
const EMITTED_HISTORY: usize = 4096;

pub struct AggregationNodeWorker {
    params: AggregationNodeParams,
    pipeline_id: PipelineId,
    /// Present in realtime mode only; drives frame requests.
    frame_buffer: Option<Arc<dyn FrameBuffer>>,
}

impl AggregationNodeWorker {
    pub fn new(
        params: AggregationNodeParams,
        pipeline_id: PipelineId,
        frame_buffer: Option<Arc<dyn FrameBuffer>>,
    ) -> Self {
        Self {
            params,
            pipeline_id,
            frame_buffer,
        }
    }
}

impl NodeWorker for AggregationNodeWorker {
    fn run(self: Box<Self>, ctx: NodeContext) {
        let (Ok(source_sub), Ok(config_sub), Ok(calibration_sub)) = (
            ctx.subscription(TopicId::SourceOutput),
            ctx.subscription(TopicId::ConfigUpdate),
            ctx.subscription(TopicId::CalibrationTrigger),
        ) else {
            log::error!(
                "aggregation node '{}' missing subscriptions; exiting",
                ctx.node_id()
            );
            return;
        };

        log::debug!(
            "aggregation node '{}' running for group {} ({} sources)",
            ctx.node_id(),
            self.params.camera_group_id,
            self.params.camera_ids.len()
        );

        let mut config_revision: u64 = 0;
        let mut task_configs = self.params.task_configs.clone();
        let mut pending: BTreeMap<FrameNumber, BTreeMap<CameraId, SourceOutputMessage>> =
            BTreeMap::new();
        let mut emitted: BTreeSet<FrameNumber> = BTreeSet::new();
        let mut latest_requested: Option<FrameNumber> = None;
        let mut last_completed: Option<FrameNumber> = None;

        while ctx.should_run() {
            ctx.idle_wait();

            // Config updates apply before the next emitted frame.
            for msg in config_sub.drain() {
                if let TopicMessage::ConfigUpdate(update) = msg {
                    log::info!(
                        "aggregation node '{}' applying config revision {}",
                        ctx.node_id(),
                        update.revision
                    );
                    config_revision = update.revision;
                    task_configs = update.task_configs;
                }
            }

            for _ in calibration_sub.drain() {
                log::info!(
                    "aggregation node '{}' starting calibration for group {} ({}x{} board)",
                    ctx.node_id(),
                    self.params.camera_group_id,
                    task_configs.calibration.board_x_squares,
                    task_configs.calibration.board_y_squares
                );
            }

            // Realtime pacing: request the newest buffered frame once
            // the previous request has completed.
            if let Some(frame_buffer) = &self.frame_buffer {
                if let Some(latest) = frame_buffer.latest_frame_number() {
                    let ready = match latest_requested {
                        None => true,
                        Some(requested) => {
                            latest > requested
                                && last_completed.map_or(false, |done| done >= requested)
                        }
                    };
                    if ready {
                        latest_requested = Some(latest);
                        if let Err(e) = ctx.publish(
                            TopicId::ProcessFrame,
                            ProcessFrameMessage {
                                frame_number: latest,
                            },
                        ) {
                            log::error!(
                                "aggregation node '{}' frame request failed: {e}",
                                ctx.node_id()
                            );
                            break;
                        }
                    }
                }
            }

            // Collect source outputs; cross-source arrival order is
            // not guaranteed.
            for msg in source_sub.drain() {
                let TopicMessage::SourceOutput(output) = msg else {
                    continue;
                };
                if !self.params.camera_ids.contains(&output.source_id) {
                    log::warn!(
                        "aggregation node '{}' ignoring unexpected source {}",
                        ctx.node_id(),
                        output.source_id
                    );
                    continue;
                }
                if emitted.contains(&output.frame_number) {
                    log::debug!(
                        "aggregation node '{}' dropping late duplicate for frame {}",
                        ctx.node_id(),
                        output.frame_number
                    );
                    continue;
                }
                pending
                    .entry(output.frame_number)
                    .or_default()
                    .insert(output.source_id.clone(), output);
            }

            // Emit every completed frame, ascending; at most one
            // output per frame number.
            let completed: Vec<FrameNumber> = pending
                .iter()
                .filter(|(_, outputs)| outputs.len() == self.params.camera_ids.len())
                .map(|(&frame, _)| frame)
                .collect();
            for frame_number in completed {
                let Some(source_outputs) = pending.remove(&frame_number) else {
                    continue;
                };
                emitted.insert(frame_number);
                while emitted.len() > EMITTED_HISTORY {
                    emitted.pop_first();
                }
                last_completed = Some(last_completed.map_or(frame_number, |c| c.max(frame_number)));

                let output = AggregationOutputMessage {
                    frame_number,
                    pipeline_id: self.pipeline_id.clone(),
                    camera_group_id: self.params.camera_group_id.clone(),
                    config_revision,
                    source_outputs,
                    // Triangulation is a downstream collaborator; the
                    // core forwards the per-source observations only.
                    points3d: BTreeMap::new(),
                };
                if let Err(e) = ctx.publish(TopicId::AggregationOutput, output) {
                    log::error!(
                        "aggregation node '{}' publish failed for frame {frame_number}: {e}",
                        ctx.node_id()
                    );
                    return;
                }
                log::trace!(
                    "aggregation node '{}' emitted frame {frame_number}",
                    ctx.node_id()
                );
            }
        }

        log::debug!("aggregation node '{}' stopped", ctx.node_id());
    }
}
