//! Uniform node lifecycle: create → start → shutdown, with a
//! non-blocking liveness probe.
//!
//! Nodes are created only by the launcher, started once, and shut down
//! at most once (idempotent). Each node runs as an independently
//! scheduled worker thread; the thread blocks only on the node's own
//! subscriptions, never on another node's state.

pub mod aggregation;
pub mod camera;
pub mod params;
pub mod video;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use mocap_types::{TopicId, TopicMessage};

use crate::error::{PipelineError, Result};
use crate::pipeline::ipc::PipelineIpc;
use crate::pubsub::{Publisher, Subscription};

pub use params::{
    AggregationNodeParams, CameraNodeParams, NodeKind, NodeParams, VideoNodeParams,
};

/// Bounded cooperative wait before a worker is forcibly abandoned.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded wait for a started worker to enter its run loop.
const START_TIMEOUT: Duration = Duration::from_secs(1);

/// Idle poll interval inside node run loops.
pub const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Unique node identifier within one pipeline, e.g. `camera-cam0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Everything a worker owns while running: its pre-allocated
/// subscriptions, a publish handle, and views of the stop state.
pub struct NodeContext {
    node_id: NodeId,
    subscriptions: HashMap<TopicId, Subscription>,
    publisher: Publisher,
    /// Node-local stop signal, set by `PipelineNode::shutdown`.
    stop: Arc<AtomicBool>,
    global_kill: Arc<AtomicBool>,
    pipeline_kill: Arc<AtomicBool>,
    heartbeat: Arc<AtomicU64>,
}

impl NodeContext {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// True until this node, its pipeline, or the whole launcher is
    /// asked to stop.
    pub fn should_run(&self) -> bool {
        !self.stop.load(Ordering::Acquire)
            && !self.pipeline_kill.load(Ordering::Acquire)
            && !self.global_kill.load(Ordering::Acquire)
    }

    /// Bounded idle wait between loop iterations.
    pub fn idle_wait(&self) {
        std::thread::sleep(IDLE_WAIT);
    }

    pub fn publish(&self, topic: TopicId, message: impl Into<TopicMessage>) -> Result<()> {
        self.publisher.publish(topic, message)
    }

    /// The pre-allocated subscription for `topic`. Missing entry means
    /// the launcher wired this node wrong; workers treat that as fatal.
    pub fn subscription(&self, topic: TopicId) -> Result<&Subscription> {
        self.subscriptions.get(&topic).ok_or_else(|| {
            PipelineError::node(
                self.node_id.as_str(),
                format!("no pre-allocated subscription for topic '{topic}'"),
            )
        })
    }

    /// Last supervisor heartbeat, epoch milliseconds.
    pub fn supervisor_heartbeat(&self) -> u64 {
        self.heartbeat.load(Ordering::Acquire)
    }
}

/// A node's run loop. Consumes the boxed worker; returning ends the
/// node's execution unit.
pub trait NodeWorker: Send {
    fn run(self: Box<Self>, ctx: NodeContext);
}

struct PendingWorker {
    worker: Box<dyn NodeWorker>,
    ctx: NodeContext,
}

/// Handle for one worker unit: id, kind tag, immutable parameters,
/// owned execution unit.
pub struct PipelineNode {
    node_id: NodeId,
    kind: NodeKind,
    params: NodeParams,
    stop: Arc<AtomicBool>,
    /// Set by the worker thread as it enters its run loop.
    entered: Arc<AtomicBool>,
    pending: Option<PendingWorker>,
    handle: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
    shut_down: bool,
}

impl PipelineNode {
    /// Factory: wire a worker to its pre-allocated subscriptions.
    ///
    /// Precondition: every subscription was produced by the pipeline's
    /// registry in the coordinating context — never inside a worker.
    /// Every topic in `params.subscribed_topics()` must be present.
    pub fn create(
        node_id: NodeId,
        params: NodeParams,
        subscriptions: HashMap<TopicId, Subscription>,
        publisher: Publisher,
        ipc: &PipelineIpc,
        worker: Box<dyn NodeWorker>,
    ) -> Result<Self> {
        for topic in params.subscribed_topics() {
            if !subscriptions.contains_key(topic) {
                return Err(PipelineError::node(
                    node_id.as_str(),
                    format!("missing required subscription for topic '{topic}'"),
                ));
            }
        }
        for (topic, sub) in &subscriptions {
            if sub.topic() != *topic {
                return Err(PipelineError::node(
                    node_id.as_str(),
                    format!("subscription for '{}' filed under '{topic}'", sub.topic()),
                ));
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let ctx = NodeContext {
            node_id: node_id.clone(),
            subscriptions,
            publisher,
            stop: Arc::clone(&stop),
            global_kill: ipc.global_kill_flag(),
            pipeline_kill: ipc.pipeline_kill_flag(),
            heartbeat: ipc.heartbeat_handle(),
        };

        Ok(Self {
            kind: params.kind(),
            node_id,
            params,
            stop,
            entered: Arc::new(AtomicBool::new(false)),
            pending: Some(PendingWorker { worker, ctx }),
            handle: None,
            started_at: None,
            shut_down: false,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn params(&self) -> &NodeParams {
        &self.params
    }

    /// When `start()` completed, for ordering diagnostics.
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Begin the node's independent execution unit. Calling twice is a
    /// programmer error.
    pub fn start(&mut self) -> Result<()> {
        if self.started_at.is_some() {
            return Err(PipelineError::invalid_input(format!(
                "node '{}' already started",
                self.node_id
            )));
        }
        if self.shut_down {
            return Err(PipelineError::invalid_input(format!(
                "node '{}' was shut down and cannot be restarted",
                self.node_id
            )));
        }
        let PendingWorker { worker, ctx } = self
            .pending
            .take()
            .ok_or_else(|| PipelineError::node(self.node_id.as_str(), "no worker to start"))?;

        log::debug!("starting node '{}' ({:?})", self.node_id, self.kind);
        let entered = Arc::clone(&self.entered);
        let handle = std::thread::Builder::new()
            .name(self.node_id.to_string())
            .spawn(move || {
                entered.store(true, Ordering::Release);
                worker.run(ctx);
            })
            .map_err(|e| {
                PipelineError::node(self.node_id.as_str(), format!("spawn failed: {e}"))
            })?;
        self.handle = Some(handle);

        // Wait (bounded) until the worker is actually inside its run
        // loop, so start ordering is observable, not assumed.
        let deadline = Instant::now() + START_TIMEOUT;
        while !self.entered.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                return Err(PipelineError::node(
                    self.node_id.as_str(),
                    "worker did not enter its run loop in time",
                ));
            }
            std::thread::sleep(IDLE_WAIT);
        }
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Non-blocking liveness probe.
    pub fn is_alive(&self) -> bool {
        if self.shut_down || self.started_at.is_none() {
            return false;
        }
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Two-phase stop: cooperative signal, bounded wait, then abandon
    /// the worker if it ignores the timeout. Always safe to call
    /// repeatedly; never raises.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            log::debug!("node '{}' already shut down; ignoring", self.node_id);
            return;
        }
        self.shut_down = true;
        // Never started: just release the worker and its subscriptions.
        self.pending = None;
        self.stop.store(true, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return;
        };

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("node '{}' worker panicked", self.node_id);
            } else {
                log::debug!("node '{}' shut down cleanly", self.node_id);
            }
        } else {
            // Backstop: the worker ignored its stop signal. Abandon the
            // thread so shutdown always completes; it can no longer
            // publish once the pipeline registry is released.
            log::warn!(
                "force terminating node '{}': worker ignored stop signal for {:?}",
                self.node_id,
                SHUTDOWN_TIMEOUT
            );
        }
    }
}

impl fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineNode")
            .field("node_id", &self.node_id)
            .field("kind", &self.kind)
            .field("started", &self.started_at.is_some())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_types::{PipelineId, QueuePolicy, TaskConfigs};

    struct SpinWorker;

    impl NodeWorker for SpinWorker {
        fn run(self: Box<Self>, ctx: NodeContext) {
            while ctx.should_run() {
                ctx.idle_wait();
            }
        }
    }

    struct InstantExitWorker;

    impl NodeWorker for InstantExitWorker {
        fn run(self: Box<Self>, _ctx: NodeContext) {}
    }

    fn test_ipc() -> PipelineIpc {
        PipelineIpc::create(
            PipelineId::from("test"),
            [
                (TopicId::ProcessFrame, QueuePolicy::default()),
                (TopicId::ConfigUpdate, QueuePolicy::default()),
                (TopicId::CalibrationTrigger, QueuePolicy::default()),
                (TopicId::SourceOutput, QueuePolicy::default()),
            ],
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicU64::new(0)),
        )
    }

    fn camera_params() -> NodeParams {
        NodeParams::Camera(CameraNodeParams {
            camera_id: "cam0".into(),
            task_configs: TaskConfigs::default(),
        })
    }

    fn subscriptions_for(ipc: &PipelineIpc, params: &NodeParams) -> HashMap<TopicId, Subscription> {
        params
            .subscribed_topics()
            .iter()
            .map(|&topic| (topic, ipc.registry().get_subscription(topic).unwrap()))
            .collect()
    }

    fn make_node(ipc: &PipelineIpc, worker: Box<dyn NodeWorker>) -> PipelineNode {
        let params = camera_params();
        let subs = subscriptions_for(ipc, &params);
        PipelineNode::create(
            NodeId::from("camera-cam0"),
            params,
            subs,
            ipc.publisher(),
            ipc,
            worker,
        )
        .unwrap()
    }

    #[test]
    fn create_rejects_missing_subscription() {
        let ipc = test_ipc();
        let err = PipelineNode::create(
            NodeId::from("camera-cam0"),
            camera_params(),
            HashMap::new(),
            ipc.publisher(),
            &ipc,
            Box::new(SpinWorker),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Node { .. }));
    }

    #[test]
    fn start_shutdown_lifecycle() {
        let ipc = test_ipc();
        let mut node = make_node(&ipc, Box::new(SpinWorker));
        assert!(!node.is_alive());

        node.start().unwrap();
        assert!(node.is_alive());
        assert_eq!(node.kind(), NodeKind::Source);

        node.shutdown();
        assert!(!node.is_alive());
    }

    #[test]
    fn double_start_is_a_programmer_error() {
        let ipc = test_ipc();
        let mut node = make_node(&ipc, Box::new(SpinWorker));
        node.start().unwrap();
        let err = node.start().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        node.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let ipc = test_ipc();
        let mut node = make_node(&ipc, Box::new(SpinWorker));
        node.start().unwrap();

        node.shutdown();
        assert!(!node.is_alive());
        // Second call: no-op, no panic, still dead.
        node.shutdown();
        assert!(!node.is_alive());
    }

    #[test]
    fn start_after_shutdown_is_rejected() {
        let ipc = test_ipc();
        let mut node = make_node(&ipc, Box::new(SpinWorker));
        node.start().unwrap();
        node.shutdown();
        assert!(matches!(
            node.start().unwrap_err(),
            PipelineError::InvalidInput(_)
        ));
    }

    #[test]
    fn worker_exit_surfaces_as_not_alive() {
        let ipc = test_ipc();
        let mut node = make_node(&ipc, Box::new(InstantExitWorker));
        node.start().unwrap();

        // The worker returns immediately; liveness must flip without
        // any shutdown call.
        let deadline = Instant::now() + Duration::from_secs(1);
        while node.is_alive() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!node.is_alive());
        node.shutdown();
    }
}
