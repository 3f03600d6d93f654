//! A launched pipeline: the constructed nodes plus the IPC context
//! connecting them, alive from launch completion to shutdown
//! completion.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use mocap_types::{PipelineId, TopicId, TopicMessage};

use crate::error::Result;
use crate::node::{NodeId, PipelineNode};
use crate::pipeline::ipc::PipelineIpc;
use crate::pipeline::launch_config::PipelineLaunchConfig;
use crate::pubsub::Subscription;

pub struct PipelineInstance {
    config: PipelineLaunchConfig,
    ipc: PipelineIpc,
    /// Creation order; shutdown walks this in reverse.
    nodes: Vec<PipelineNode>,
    /// Consumer subscription for the combined output, pre-allocated at
    /// launch so the registry can seal. Taken once by the facade.
    output_subscription: Option<Subscription>,
    /// Monotonic config revision, bumped on each published update.
    config_revision: AtomicU64,
    shut_down: bool,
}

impl PipelineInstance {
    pub(crate) fn new(
        config: PipelineLaunchConfig,
        ipc: PipelineIpc,
        nodes: Vec<PipelineNode>,
        output_subscription: Subscription,
    ) -> Self {
        Self {
            config,
            ipc,
            nodes,
            output_subscription: Some(output_subscription),
            config_revision: AtomicU64::new(0),
            shut_down: false,
        }
    }

    pub fn pipeline_id(&self) -> &PipelineId {
        self.ipc.pipeline_id()
    }

    pub fn config(&self) -> &PipelineLaunchConfig {
        &self.config
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.node_id().clone()).collect()
    }

    /// The constructed nodes in creation order.
    pub fn nodes(&self) -> &[PipelineNode] {
        &self.nodes
    }

    /// True while every node's execution unit is still running.
    pub fn is_alive(&self) -> bool {
        !self.shut_down && !self.nodes.is_empty() && self.nodes.iter().all(|n| n.is_alive())
    }

    /// Publish into this pipeline's topic space.
    pub fn publish(&self, topic: TopicId, message: impl Into<TopicMessage>) -> Result<()> {
        self.ipc.publisher().publish(topic, message)
    }

    /// The pre-allocated combined-output subscription. Returns `None`
    /// after the first call.
    pub fn take_output_subscription(&mut self) -> Option<Subscription> {
        self.output_subscription.take()
    }

    /// Bump and return the revision a new config update should carry.
    pub fn next_config_revision(&self) -> u64 {
        self.config_revision.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn set_config(&mut self, config: PipelineLaunchConfig) {
        self.config = config;
    }

    /// Record that the supervising side is alive.
    pub fn touch_heartbeat(&self) {
        self.ipc.touch_heartbeat();
    }

    /// Tear everything down: nodes in reverse creation order, then the
    /// IPC context. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            log::debug!(
                "pipeline {} already shut down; ignoring",
                self.pipeline_id()
            );
            return;
        }
        self.shut_down = true;
        log::info!(
            "shutting down pipeline {} ({} nodes)",
            self.pipeline_id(),
            self.nodes.len()
        );
        // Raise the pipeline kill flag first so every node sees the
        // stop request at the same time, then wait on each in turn.
        self.ipc.kill_pipeline();
        for node in self.nodes.iter_mut().rev() {
            node.shutdown();
        }
        self.output_subscription = None;
        self.ipc.release();
        log::info!("pipeline {} shut down", self.pipeline_id());
    }
}

impl Drop for PipelineInstance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for PipelineInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineInstance")
            .field("pipeline_id", self.pipeline_id())
            .field("nodes", &self.node_ids())
            .field("alive", &self.is_alive())
            .finish()
    }
}
