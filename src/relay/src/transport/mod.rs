//! The message bus seam. Implementations provide topic/subscription
//! provisioning, publishing and at-least-once delivery.

use std::future::Future;

use bytes::Bytes;
use futures::{future::BoxFuture, stream::BoxStream};

pub mod memory;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub topic: String,
    pub name: String,
}

/// Acknowledges one delivery to the transport.
pub trait Acknowledge: Send + 'static {
    fn ack(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>>;
}

pub struct Delivery {
    pub payload: Bytes,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(payload: Bytes, acker: impl Acknowledge) -> Self {
        Self {
            payload,
            acker: Box::new(acker),
        }
    }

    /// Splits the delivery so the payload can be processed after acknowledging.
    pub fn into_parts(self) -> (Bytes, Box<dyn Acknowledge>) {
        (self.payload, self.acker)
    }
}

pub type Deliveries = BoxStream<'static, anyhow::Result<Delivery>>;

pub trait Transport: Send + Sync + 'static {
    /// Fetches the topic called `name`, creating it if needed. Must be idempotent.
    fn ensure_topic(&self, name: &str) -> impl Future<Output = anyhow::Result<TopicHandle>> + Send;

    /// Fetches the subscription `name` on `topic`, creating it if needed. Must be idempotent.
    fn ensure_subscription(
        &self,
        topic: &TopicHandle,
        name: &str,
    ) -> impl Future<Output = anyhow::Result<SubscriptionHandle>> + Send;

    fn publish(
        &self,
        topic: &TopicHandle,
        payload: Bytes,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Starts receiving the messages queued on `subscription`.
    fn consume(
        &self,
        subscription: &SubscriptionHandle,
    ) -> impl Future<Output = anyhow::Result<Deliveries>> + Send;
}

/// Opens a transport for a project (account, virtual host, ...).
pub trait Connect: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(
        &self,
        project_id: &str,
    ) -> impl Future<Output = anyhow::Result<Self::Transport>> + Send;
}
