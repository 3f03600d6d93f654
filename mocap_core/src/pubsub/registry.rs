//! Topic registry: owns the mapping from topic identity to channel and
//! brokers every publish and subscribe in one pipeline.
//!
//! Lifecycle contract:
//! - The registry is created with its full topic set up front; asking
//!   for an unregistered topic fails fast.
//! - Subscriptions may only be allocated while the registry is *open*
//!   (the launcher's coordinating phase). The launcher calls [`seal`]
//!   before any worker starts; allocation after that point is a hard
//!   error, not a race.
//! - Publishing fans out to every outstanding subscription and never
//!   blocks the publisher — a full queue applies the topic's explicit
//!   [`QueuePolicy`] instead.
//!
//! [`seal`]: TopicRegistry::seal

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use mocap_types::{OverflowBehavior, QueuePolicy, TopicId, TopicMessage};

use crate::error::{PipelineError, Result};

/// Owned receive handle for one (node, topic) pair.
///
/// Created only by [`TopicRegistry::get_subscription`]; ownership
/// transfers to the node at construction and is never shared.
pub struct Subscription {
    topic: TopicId,
    rx: Receiver<TopicMessage>,
    // Dropping this is how the registry learns the subscriber is gone;
    // the registry keeps a reaper receiver, so plain channel
    // disconnection never fires.
    _alive: Arc<()>,
}

impl Subscription {
    pub fn topic(&self) -> TopicId {
        self.topic
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<TopicMessage> {
        self.rx.try_recv().ok()
    }

    /// Bounded-wait receive; `None` on timeout or channel teardown.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TopicMessage> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<TopicMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("queued", &self.rx.len())
            .finish()
    }
}

/// Delivery counters for one topic, for shutdown-time diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// One subscriber's queue endpoints. The `reaper` receiver lets the
/// publish path discard the oldest element when a drop-oldest queue
/// fills; it is never handed out.
struct Endpoint {
    tx: Sender<TopicMessage>,
    reaper: Receiver<TopicMessage>,
    subscriber: std::sync::Weak<()>,
}

struct TopicSlot {
    policy: QueuePolicy,
    endpoints: Mutex<Vec<Endpoint>>,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl TopicSlot {
    fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            endpoints: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn stats(&self) -> TopicStats {
        TopicStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Pipeline-scoped topic registry.
pub struct TopicRegistry {
    topics: HashMap<TopicId, TopicSlot>,
    sealed: AtomicBool,
}

impl TopicRegistry {
    /// Create a registry serving exactly the given topics, each with
    /// its explicit queue policy.
    pub fn new(topics: impl IntoIterator<Item = (TopicId, QueuePolicy)>) -> Self {
        let topics = topics
            .into_iter()
            .map(|(id, policy)| (id, TopicSlot::new(policy)))
            .collect();
        Self {
            topics,
            sealed: AtomicBool::new(false),
        }
    }

    /// Create a registry with the default policy for every topic.
    pub fn with_default_policy(topics: impl IntoIterator<Item = TopicId>) -> Self {
        Self::new(topics.into_iter().map(|id| (id, QueuePolicy::default())))
    }

    pub fn registered_topics(&self) -> Vec<TopicId> {
        let mut ids: Vec<_> = self.topics.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Allocate a receive handle for `topic`.
    ///
    /// Only valid during the coordinating phase: calling this after
    /// [`seal`](Self::seal) violates the pre-allocation contract and
    /// returns an error.
    pub fn get_subscription(&self, topic: TopicId) -> Result<Subscription> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(PipelineError::communication(
                topic,
                "registry is sealed; subscriptions must be allocated before any node starts",
            ));
        }
        let slot = self.topics.get(&topic).ok_or_else(|| {
            PipelineError::communication(topic, "topic is not registered in this pipeline")
        })?;

        let (tx, rx) = bounded(slot.policy.capacity);
        let alive = Arc::new(());
        let mut endpoints = slot.endpoints.lock();
        endpoints.push(Endpoint {
            tx,
            reaper: rx.clone(),
            subscriber: Arc::downgrade(&alive),
        });
        log::trace!(
            "allocated subscription for topic '{}' ({} outstanding)",
            topic,
            endpoints.len()
        );
        drop(endpoints);
        Ok(Subscription {
            topic,
            rx,
            _alive: alive,
        })
    }

    /// End the coordinating phase. Idempotent.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Number of outstanding subscriptions for a topic.
    pub fn subscription_count(&self, topic: TopicId) -> usize {
        self.topics
            .get(&topic)
            .map(|slot| slot.endpoints.lock().len())
            .unwrap_or(0)
    }

    /// Deliver `message` to every outstanding subscription for `topic`.
    ///
    /// Never blocks: a full drop-oldest queue discards its oldest
    /// element, a full drop-newest queue discards `message` for that
    /// subscriber. The payload variant must match the topic.
    pub fn publish(&self, topic: TopicId, message: impl Into<TopicMessage>) -> Result<()> {
        let message = message.into();
        if message.topic() != topic {
            return Err(PipelineError::invalid_input(format!(
                "payload for topic '{}' published on topic '{}'",
                message.topic(),
                topic
            )));
        }
        let slot = self.topics.get(&topic).ok_or_else(|| {
            PipelineError::communication(topic, "topic is not registered in this pipeline")
        })?;

        slot.published.fetch_add(1, Ordering::Relaxed);

        let mut endpoints = slot.endpoints.lock();
        endpoints.retain(|endpoint| {
            if endpoint.subscriber.strong_count() == 0 {
                // Subscriber dropped its handle; forget the endpoint.
                return false;
            }
            let mut outgoing = message.clone();
            loop {
                match endpoint.tx.try_send(outgoing) {
                    Ok(()) => {
                        slot.delivered.fetch_add(1, Ordering::Relaxed);
                        return true;
                    }
                    Err(TrySendError::Full(returned)) => {
                        slot.dropped.fetch_add(1, Ordering::Relaxed);
                        match slot.policy.on_full {
                            OverflowBehavior::DropOldest => {
                                // Make room, then retry the send.
                                let _ = endpoint.reaper.try_recv();
                                outgoing = returned;
                            }
                            OverflowBehavior::DropNewest => return true,
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => return false,
                }
            }
        });
        Ok(())
    }

    pub fn stats(&self, topic: TopicId) -> Option<TopicStats> {
        self.topics.get(&topic).map(|slot| slot.stats())
    }

    /// Log per-topic delivery counters, called at pipeline teardown.
    pub fn log_stats(&self) {
        for topic in self.registered_topics() {
            if let Some(stats) = self.stats(topic) {
                log::debug!(
                    "topic '{}': published={} delivered={} dropped={}",
                    topic,
                    stats.published,
                    stats.delivered,
                    stats.dropped
                );
            }
        }
    }
}

/// Cheap cloneable publish-only handle handed to nodes. Cannot
/// allocate subscriptions.
#[derive(Clone)]
pub struct Publisher {
    registry: Arc<TopicRegistry>,
}

impl Publisher {
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self { registry }
    }

    pub fn publish(&self, topic: TopicId, message: impl Into<TopicMessage>) -> Result<()> {
        self.registry.publish(topic, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_types::{CalibrationTriggerMessage, ProcessFrameMessage};

    fn registry() -> TopicRegistry {
        TopicRegistry::with_default_policy([
            TopicId::ProcessFrame,
            TopicId::CalibrationTrigger,
        ])
    }

    #[test]
    fn publish_fans_out_to_all_subscriptions() {
        let registry = registry();
        let sub_a = registry.get_subscription(TopicId::ProcessFrame).unwrap();
        let sub_b = registry.get_subscription(TopicId::ProcessFrame).unwrap();

        registry
            .publish(TopicId::ProcessFrame, ProcessFrameMessage { frame_number: 1 })
            .unwrap();

        assert_eq!(sub_a.len(), 1);
        assert_eq!(sub_b.len(), 1);
    }

    #[test]
    fn unregistered_topic_fails_fast() {
        let registry = registry();
        assert!(registry.get_subscription(TopicId::SourceOutput).is_err());
        let err = registry
            .publish(
                TopicId::SourceOutput,
                mocap_types::SourceOutputMessage {
                    source_id: "cam0".into(),
                    frame_number: 0,
                    observation: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Communication { .. }));
    }

    #[test]
    fn sealed_registry_rejects_subscription() {
        let registry = registry();
        registry.seal();
        let err = registry.get_subscription(TopicId::ProcessFrame).unwrap_err();
        assert!(matches!(err, PipelineError::Communication { .. }));
        // Publishing stays allowed after seal.
        registry
            .publish(TopicId::CalibrationTrigger, CalibrationTriggerMessage)
            .unwrap();
    }

    #[test]
    fn mismatched_payload_rejected() {
        let registry = registry();
        let err = registry
            .publish(TopicId::ProcessFrame, CalibrationTriggerMessage)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn drop_oldest_discards_head_and_keeps_publisher_unblocked() {
        let registry = TopicRegistry::new([(TopicId::ProcessFrame, QueuePolicy::bounded(2))]);
        let sub = registry.get_subscription(TopicId::ProcessFrame).unwrap();

        for frame_number in 0..5 {
            registry
                .publish(TopicId::ProcessFrame, ProcessFrameMessage { frame_number })
                .unwrap();
        }

        // Capacity 2, drop-oldest: only the two newest survive.
        let frames: Vec<_> = sub
            .drain()
            .into_iter()
            .map(|msg| match msg {
                TopicMessage::ProcessFrame(m) => m.frame_number,
                other => panic!("unexpected message {other:?}"),
            })
            .collect();
        assert_eq!(frames, vec![3, 4]);

        let stats = registry.stats(TopicId::ProcessFrame).unwrap();
        assert_eq!(stats.published, 5);
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn drop_newest_keeps_backlog() {
        let registry = TopicRegistry::new([(
            TopicId::ProcessFrame,
            QueuePolicy {
                capacity: 2,
                on_full: OverflowBehavior::DropNewest,
            },
        )]);
        let sub = registry.get_subscription(TopicId::ProcessFrame).unwrap();

        for frame_number in 0..5 {
            registry
                .publish(TopicId::ProcessFrame, ProcessFrameMessage { frame_number })
                .unwrap();
        }

        let frames: Vec<_> = sub
            .drain()
            .into_iter()
            .map(|msg| match msg {
                TopicMessage::ProcessFrame(m) => m.frame_number,
                other => panic!("unexpected message {other:?}"),
            })
            .collect();
        assert_eq!(frames, vec![0, 1]);
    }

    #[test]
    fn dropped_subscription_is_reaped_on_next_publish() {
        let registry = registry();
        let sub = registry.get_subscription(TopicId::ProcessFrame).unwrap();
        assert_eq!(registry.subscription_count(TopicId::ProcessFrame), 1);

        drop(sub);
        registry
            .publish(TopicId::ProcessFrame, ProcessFrameMessage { frame_number: 0 })
            .unwrap();
        assert_eq!(registry.subscription_count(TopicId::ProcessFrame), 0);
    }
}
