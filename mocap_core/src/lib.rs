//! # Mocap Core
//!
//! Process-orchestration core for a multi-camera motion-capture
//! pipeline. This crate provides the building blocks that turn a set
//! of cameras or recorded videos into one synchronized output stream:
//!
//! - **Pub/Sub**: a sealed per-pipeline topic registry with bounded,
//!   policy-governed queues
//! - **Nodes**: source and aggregation workers with a uniform
//!   create/start/shutdown/is_alive lifecycle
//! - **Pipelines**: realtime (live cameras) and posthoc (recorded
//!   videos) launch configurations, a fixed-order launcher, and
//!   mode-specific facades
//! - **Manager**: one lock-guarded owner for every running pipeline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mocap_core::{NullProcessorFactory, PipelineManager};
//! use mocap_types::TaskConfigs;
//!
//! let manager = PipelineManager::new();
//! let _pipeline_id = manager.create_posthoc_pipeline(
//!     "/recordings/session_2024",
//!     Some("synchronized_videos"),
//!     "mp4",
//!     TaskConfigs::default(),
//!     &NullProcessorFactory,
//! )?;
//! # Ok::<(), mocap_core::PipelineError>(())
//! ```

pub mod collaborators;
pub mod error;
pub mod node;
pub mod pipeline;
pub mod pubsub;

pub use collaborators::{
    discover_videos, CameraGroup, FrameBuffer, FrameProcessor, FrameProcessorFactory,
    NullFrameProcessor, NullProcessorFactory,
};
pub use error::{PipelineError, Result};
pub use node::{
    AggregationNodeParams, CameraNodeParams, NodeContext, NodeId, NodeKind, NodeParams,
    NodeWorker, PipelineNode, VideoNodeParams, SHUTDOWN_TIMEOUT,
};
pub use pipeline::{
    ManagedPipeline, PipelineInstance, PipelineIpc, PipelineLaunchConfig, PipelineLauncher,
    PipelineManager, PipelineMode, PipelineState, PosthocLaunchConfig, PosthocPipeline,
    RealtimeLaunchConfig, RealtimePipeline,
};
pub use pubsub::{Publisher, Subscription, TopicRegistry, TopicStats};

// Re-export the shared type vocabulary so downstream callers need only
// one dependency.
pub use mocap_types;

// Re-export serde_json for consistent observation-payload typing.
pub use serde_json;
