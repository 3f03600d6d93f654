//! Pipeline-scoped IPC context: the topic registry plus the shared
//! shutdown and heartbeat state.
//!
//! The kill flags and heartbeat are the only state mutated from more
//! than one context; both are plain atomics. Nodes read them, the
//! launcher and supervisor write them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use mocap_types::{PipelineId, QueuePolicy, TopicId};

use crate::pubsub::{Publisher, TopicRegistry};

/// Everything a pipeline's nodes share: registry, kill flags, heartbeat.
pub struct PipelineIpc {
    pipeline_id: PipelineId,
    registry: Arc<TopicRegistry>,
    /// Launcher-wide kill switch, shared across pipelines.
    global_kill: Arc<AtomicBool>,
    /// This pipeline's own kill flag, set at instance shutdown.
    pipeline_kill: Arc<AtomicBool>,
    /// Supervisor heartbeat, epoch milliseconds. Written only by the
    /// supervising side; nodes may read it.
    heartbeat: Arc<AtomicU64>,
}

impl PipelineIpc {
    pub fn create(
        pipeline_id: PipelineId,
        topics: impl IntoIterator<Item = (TopicId, QueuePolicy)>,
        global_kill: Arc<AtomicBool>,
        heartbeat: Arc<AtomicU64>,
    ) -> Self {
        Self {
            pipeline_id,
            registry: Arc::new(TopicRegistry::new(topics)),
            global_kill,
            pipeline_kill: Arc::new(AtomicBool::new(false)),
            heartbeat,
        }
    }

    pub fn pipeline_id(&self) -> &PipelineId {
        &self.pipeline_id
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(Arc::clone(&self.registry))
    }

    /// True while neither the launcher-wide nor the pipeline-scoped
    /// kill flag has been raised.
    pub fn should_continue(&self) -> bool {
        !self.global_kill.load(Ordering::Acquire) && !self.pipeline_kill.load(Ordering::Acquire)
    }

    /// Raise this pipeline's kill flag.
    pub fn kill_pipeline(&self) {
        self.pipeline_kill.store(true, Ordering::Release);
    }

    pub(crate) fn pipeline_kill_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pipeline_kill)
    }

    pub(crate) fn global_kill_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.global_kill)
    }

    pub(crate) fn heartbeat_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.heartbeat)
    }

    /// Record "the supervisor is alive right now".
    pub fn touch_heartbeat(&self) {
        self.heartbeat.store(epoch_millis(), Ordering::Release);
    }

    pub fn heartbeat_millis(&self) -> u64 {
        self.heartbeat.load(Ordering::Acquire)
    }

    /// Tear down the IPC context: raise the pipeline kill flag and log
    /// delivery counters. Safe to call more than once.
    pub fn release(&self) {
        self.kill_pipeline();
        self.registry.log_stats();
    }
}

pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
