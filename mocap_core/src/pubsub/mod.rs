//! Publish/subscribe plumbing: the topic registry and its handles.

pub mod registry;

pub use registry::{Publisher, Subscription, TopicRegistry, TopicStats};
