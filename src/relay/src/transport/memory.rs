//! In-process bus with pub/sub fan-out semantics: every subscription bound to a
//! topic gets its own copy of each message published after it was created.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::Context;
use bytes::Bytes;
use futures::{future::BoxFuture, FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    Acknowledge, Connect, Deliveries, Delivery, SubscriptionHandle, TopicHandle, Transport,
};
use crate::envelope::ChangeEnvelope;

#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    topics: HashMap<String, Vec<Bytes>>,
    subscriptions: HashMap<String, Queue>,
    rejected_topics: HashSet<String>,
    projects: BTreeSet<String>,
}

struct Queue {
    topic: String,
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    acked: Arc<AtomicUsize>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes provisioning of `topic` fail from now on.
    pub fn reject_topic(&self, topic: impl Into<String>) {
        self.state.lock().rejected_topics.insert(topic.into());
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.state.lock().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn subscriptions(&self, topic: &str) -> Vec<String> {
        let mut names: Vec<_> = self
            .state
            .lock()
            .subscriptions
            .iter()
            .filter(|(_, queue)| queue.topic == topic)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every payload published to `topic`, oldest first.
    pub fn published(&self, topic: &str) -> Vec<Bytes> {
        self.state
            .lock()
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub fn envelopes(&self, topic: &str) -> Vec<ChangeEnvelope> {
        self.published(topic)
            .iter()
            .filter_map(|payload| ChangeEnvelope::decode(payload).ok())
            .collect()
    }

    pub fn acked(&self, subscription: &str) -> usize {
        self.state
            .lock()
            .subscriptions
            .get(subscription)
            .map_or(0, |queue| queue.acked.load(Ordering::SeqCst))
    }

    /// Projects this bus was connected for.
    pub fn projects(&self) -> Vec<String> {
        self.state.lock().projects.iter().cloned().collect()
    }
}

impl Transport for MemoryBus {
    async fn ensure_topic(&self, name: &str) -> anyhow::Result<TopicHandle> {
        let mut state = self.state.lock();
        anyhow::ensure!(
            !state.rejected_topics.contains(name),
            "topic `{name}` cannot be provisioned"
        );
        state.topics.entry(name.to_owned()).or_default();
        Ok(TopicHandle {
            name: name.to_owned(),
        })
    }

    async fn ensure_subscription(
        &self,
        topic: &TopicHandle,
        name: &str,
    ) -> anyhow::Result<SubscriptionHandle> {
        let mut state = self.state.lock();
        anyhow::ensure!(
            state.topics.contains_key(&topic.name),
            "topic `{}` does not exist",
            topic.name
        );
        let queue = state.subscriptions.entry(name.to_owned()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            Queue {
                topic: topic.name.clone(),
                tx,
                rx: Some(rx),
                acked: Arc::default(),
            }
        });
        anyhow::ensure!(
            queue.topic == topic.name,
            "subscription `{name}` is bound to topic `{}`",
            queue.topic
        );
        Ok(SubscriptionHandle {
            topic: topic.name.clone(),
            name: name.to_owned(),
        })
    }

    async fn publish(&self, topic: &TopicHandle, payload: Bytes) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state
            .topics
            .get_mut(&topic.name)
            .with_context(|| format!("topic `{}` does not exist", topic.name))?
            .push(payload.clone());
        for queue in state.subscriptions.values() {
            if queue.topic == topic.name {
                // A closed receiver means the consumer went away; the message is dropped for it.
                let _ = queue.tx.send(payload.clone());
            }
        }
        Ok(())
    }

    async fn consume(&self, subscription: &SubscriptionHandle) -> anyhow::Result<Deliveries> {
        let (rx, acked) = {
            let mut state = self.state.lock();
            let queue = state
                .subscriptions
                .get_mut(&subscription.name)
                .with_context(|| format!("subscription `{}` does not exist", subscription.name))?;
            let rx = queue
                .rx
                .take()
                .with_context(|| format!("subscription `{}` already has a consumer", subscription.name))?;
            (rx, queue.acked.clone())
        };

        let deliveries = futures::stream::unfold((rx, acked), |(mut rx, acked)| async move {
            let payload = rx.recv().await?;
            let delivery = Delivery::new(payload, MemoryAck(acked.clone()));
            Some((Ok(delivery), (rx, acked)))
        });
        Ok(deliveries.boxed())
    }
}

impl Connect for MemoryBus {
    type Transport = MemoryBus;

    async fn connect(&self, project_id: &str) -> anyhow::Result<MemoryBus> {
        self.state.lock().projects.insert(project_id.to_owned());
        Ok(self.clone())
    }
}

struct MemoryAck(Arc<AtomicUsize>);

impl Acknowledge for MemoryAck {
    fn ack(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        futures::future::ok(()).boxed()
    }
}
