//! The only component allowed to turn a launch config into live nodes.
//!
//! Launch is a fixed-order algorithm: validate the mode's required
//! resource, build the IPC context, pre-allocate every subscription
//! and seal the registry, construct nodes, start them consumers-first,
//! then verify liveness. Any failure rolls back whatever already
//! exists; a partial pipeline is never handed to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use mocap_types::{PipelineId, QueuePolicy, TopicId};

use crate::collaborators::{CameraGroup, FrameBuffer, FrameProcessorFactory};
use crate::error::{PipelineError, Result};
use crate::node::aggregation::AggregationNodeWorker;
use crate::node::camera::CameraNodeWorker;
use crate::node::video::VideoNodeWorker;
use crate::node::{NodeId, NodeParams, NodeWorker, PipelineNode};
use crate::pipeline::instance::PipelineInstance;
use crate::pipeline::ipc::PipelineIpc;
use crate::pipeline::launch_config::{PipelineLaunchConfig, PipelineMode};
use crate::pubsub::Subscription;

/// Grace period between starting the nodes and checking that every
/// one of them is still running.
const LIVENESS_SETTLE: Duration = Duration::from_millis(50);

/// Launches pipelines and owns the launcher-wide kill switch shared by
/// every pipeline it creates.
#[derive(Clone)]
pub struct PipelineLauncher {
    global_kill: Arc<AtomicBool>,
    heartbeat: Arc<AtomicU64>,
}

impl Default for PipelineLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineLauncher {
    pub fn new() -> Self {
        Self {
            global_kill: Arc::new(AtomicBool::new(false)),
            heartbeat: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Raise the launcher-wide kill switch. Every node of every
    /// pipeline launched from this launcher observes it.
    pub fn kill_all(&self) {
        log::warn!("global kill switch raised");
        self.global_kill.store(true, Ordering::Release);
    }

    pub fn launch(
        &self,
        config: PipelineLaunchConfig,
        camera_group: Option<Arc<dyn CameraGroup>>,
        processor_factory: &dyn FrameProcessorFactory,
    ) -> Result<PipelineInstance> {
        // 1. Mode-specific resource validation, before anything exists.
        let frame_buffer = match (&config, &camera_group) {
            (PipelineLaunchConfig::Realtime(_), Some(group)) => Some(group.frame_buffer()),
            (PipelineLaunchConfig::Realtime(_), None) => {
                return Err(PipelineError::config(
                    "realtime pipeline requires a camera group",
                ));
            }
            (PipelineLaunchConfig::Posthoc(posthoc), _) => {
                if !posthoc.recording_path.exists() {
                    return Err(PipelineError::not_found(format!(
                        "recording directory not found: {}",
                        posthoc.recording_path.display()
                    )));
                }
                None
            }
        };

        let pipeline_id = PipelineId::new(Uuid::new_v4().to_string());
        log::info!(
            "launching {:?} pipeline {} for group {}",
            config.mode(),
            pipeline_id,
            config.camera_group_id()
        );

        // 2. Pipeline-scoped IPC context with exactly the topics this
        // config needs.
        let ipc = PipelineIpc::create(
            pipeline_id.clone(),
            config
                .get_required_topics()
                .into_iter()
                .map(|topic| (topic, QueuePolicy::default())),
            Arc::clone(&self.global_kill),
            Arc::clone(&self.heartbeat),
        );

        // 3. Pre-allocate every subscription in this coordinating
        // context, plus the facade's output consumer, then seal.
        let all_params = config.get_all_node_params();
        let mut allocated: Vec<(NodeId, NodeParams, HashMap<TopicId, Subscription>)> =
            Vec::with_capacity(all_params.len());
        for (node_id, params) in all_params {
            let mut subscriptions = HashMap::new();
            for &topic in params.subscribed_topics() {
                subscriptions.insert(topic, ipc.registry().get_subscription(topic)?);
            }
            allocated.push((node_id, params, subscriptions));
        }
        let output_subscription = ipc.registry().get_subscription(TopicId::AggregationOutput)?;
        ipc.registry().seal();

        // 4. Construct nodes, sources first, aggregation last. Failure
        // rolls back whatever is already constructed.
        let mut nodes: Vec<PipelineNode> = Vec::with_capacity(allocated.len());
        for (node_id, params, subscriptions) in allocated {
            let built = make_worker(&pipeline_id, &params, frame_buffer.clone(), processor_factory)
                .and_then(|worker| {
                    PipelineNode::create(node_id, params, subscriptions, ipc.publisher(), &ipc, worker)
                });
            match built {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    rollback(&mut nodes, &ipc);
                    return Err(PipelineError::launch(format!(
                        "node construction failed: {e}"
                    )));
                }
            }
        }

        // 5. Start consumers before producers: the aggregation node is
        // last in creation order but starts first.
        if let Err(e) = start_all(&mut nodes) {
            rollback(&mut nodes, &ipc);
            return Err(PipelineError::launch(format!("node start failed: {e}")));
        }

        // 6. Liveness check; a node that came up and immediately died
        // means the pipeline never worked.
        std::thread::sleep(LIVENESS_SETTLE);
        if let Some(dead) = nodes.iter().find(|n| !n.is_alive()) {
            let dead_id = dead.node_id().clone();
            rollback(&mut nodes, &ipc);
            return Err(PipelineError::launch(format!(
                "node '{dead_id}' did not stay alive after start"
            )));
        }

        ipc.touch_heartbeat();
        log::info!(
            "pipeline {} launched with {} nodes",
            pipeline_id,
            nodes.len()
        );
        Ok(PipelineInstance::new(config, ipc, nodes, output_subscription))
    }
}

fn make_worker(
    pipeline_id: &PipelineId,
    params: &NodeParams,
    frame_buffer: Option<Arc<dyn FrameBuffer>>,
    processor_factory: &dyn FrameProcessorFactory,
) -> Result<Box<dyn NodeWorker>> {
    Ok(match params {
        NodeParams::Camera(p) => {
            let buffer = frame_buffer.ok_or_else(|| {
                PipelineError::launch("camera node requires a frame buffer")
            })?;
            Box::new(CameraNodeWorker::new(
                p.clone(),
                processor_factory.create(&p.camera_id),
                buffer,
            ))
        }
        NodeParams::Video(p) => Box::new(VideoNodeWorker::new(
            p.clone(),
            processor_factory.create(&p.camera_id),
        )),
        NodeParams::Aggregation(p) => Box::new(AggregationNodeWorker::new(
            p.clone(),
            pipeline_id.clone(),
            frame_buffer,
        )),
    })
}

/// Start the aggregation node (creation-order last), then the sources
/// in creation order.
fn start_all(nodes: &mut [PipelineNode]) -> Result<()> {
    let Some((aggregation, sources)) = nodes.split_last_mut() else {
        return Err(PipelineError::launch("pipeline has no nodes"));
    };
    aggregation.start()?;
    for node in sources {
        node.start()?;
    }
    Ok(())
}

fn rollback(nodes: &mut Vec<PipelineNode>, ipc: &PipelineIpc) {
    log::warn!("rolling back partially launched pipeline {}", ipc.pipeline_id());
    for node in nodes.iter_mut().rev() {
        node.shutdown();
    }
    nodes.clear();
    ipc.release();
}
