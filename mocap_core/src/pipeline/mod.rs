//! Pipeline assembly: configs, launcher, instances, facades, manager.

pub mod facade;
pub mod instance;
pub mod ipc;
pub mod launch_config;
pub mod launcher;
pub mod manager;

pub use facade::{PosthocPipeline, RealtimePipeline};
pub use instance::PipelineInstance;
pub use ipc::PipelineIpc;
pub use launch_config::{
    PipelineLaunchConfig, PipelineMode, PosthocLaunchConfig, RealtimeLaunchConfig,
};
pub use launcher::PipelineLauncher;
pub use manager::{ManagedPipeline, PipelineManager, PipelineState};
