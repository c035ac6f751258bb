//! Topic and subscription naming, and their provisioning through the transport.

use std::fmt;

use crate::transport::{SubscriptionHandle, TopicHandle, Transport};

pub const SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName(String);

impl TopicName {
    pub fn new(environment: &str, model_name: &str) -> Self {
        Self(format!("{environment}{SEPARATOR}{model_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionName(String);

impl SubscriptionName {
    pub fn new(environment: &str, service_name: &str, model_name: &str) -> Self {
        Self(format!(
            "{environment}{SEPARATOR}{service_name}{SEPARATOR}{model_name}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fetches or creates the topic carrying changes of `model_name`.
pub async fn resolve_topic<T: Transport>(
    transport: &T,
    environment: &str,
    model_name: &str,
) -> anyhow::Result<TopicHandle> {
    let name = TopicName::new(environment, model_name);
    let topic = transport.ensure_topic(name.as_str()).await?;
    tracing::trace!(topic = %topic.name, "topic resolved");
    Ok(topic)
}

/// Fetches or creates this service's subscription to `topic`.
pub async fn resolve_subscription<T: Transport>(
    transport: &T,
    topic: &TopicHandle,
    environment: &str,
    service_name: &str,
    model_name: &str,
) -> anyhow::Result<SubscriptionHandle> {
    let name = SubscriptionName::new(environment, service_name, model_name);
    let subscription = transport.ensure_subscription(topic, name.as_str()).await?;
    tracing::trace!(
        topic = %topic.name,
        subscription = %subscription.name,
        "subscription resolved"
    );
    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_scoped_by_environment() {
        assert_eq!(TopicName::new("staging", "Customer").as_str(), "staging__Customer");
    }

    #[test]
    fn subscription_is_scoped_by_environment_and_service() {
        assert_eq!(
            SubscriptionName::new("staging", "orders", "Customer").as_str(),
            "staging__orders__Customer"
        );
        assert_ne!(
            SubscriptionName::new("staging", "orders", "Customer"),
            SubscriptionName::new("staging", "billing", "Customer"),
        );
    }
}
