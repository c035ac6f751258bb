//! Client side: one delivery loop per subscribed model, feeding an [`EventHandler`].

use std::{collections::BTreeSet, sync::Arc};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    actor,
    config::ActorPolicy,
    envelope::{ChangeEnvelope, ChangeEvent},
    error::Result,
    naming,
    transport::{Deliveries, Transport},
};

pub mod handler;

pub use handler::{EventHandler, LogHandler};

pub struct Subscriber<T: Transport> {
    service_name: String,
    environment: String,
    transport: Arc<T>,
    models: Mutex<BTreeSet<String>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> Subscriber<T> {
    pub(crate) fn new(service_name: String, environment: String, transport: Arc<T>) -> Self {
        Self {
            service_name,
            environment,
            transport,
            models: Mutex::default(),
            listeners: Mutex::default(),
        }
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().iter().cloned().collect()
    }

    /// Subscribes to each model in turn; a model is fully set up before the
    /// next one is attempted, and the first failure stops the sequence.
    pub(crate) async fn subscribe(
        &self,
        models: &[String],
        handler: Arc<dyn EventHandler>,
        policy: ActorPolicy,
    ) -> Result<()> {
        for model in models {
            if self.models.lock().contains(model) {
                tracing::debug!(service = %self.service_name, model = %model, "already subscribed");
                continue;
            }

            let topic =
                naming::resolve_topic(self.transport.as_ref(), &self.environment, model).await?;
            let subscription = naming::resolve_subscription(
                self.transport.as_ref(),
                &topic,
                &self.environment,
                &self.service_name,
                model,
            )
            .await?;
            let deliveries = self.transport.consume(&subscription).await?;

            let listener = Listener {
                model: model.clone(),
                subscription: subscription.name.clone(),
                handler: handler.clone(),
                policy,
            };
            self.listeners
                .lock()
                .push(tokio::spawn(listener.listen(deliveries)));
            self.models.lock().insert(model.clone());

            tracing::info!(
                service = %self.service_name,
                subscription = %subscription.name,
                "subscribed"
            );
        }
        Ok(())
    }

    pub(crate) fn shutdown(&self) {
        for listener in self.listeners.lock().drain(..) {
            listener.abort();
        }
    }
}

struct Listener {
    model: String,
    subscription: String,
    handler: Arc<dyn EventHandler>,
    policy: ActorPolicy,
}

impl Listener {
    async fn listen(self, mut deliveries: Deliveries) {
        while let Some(delivery) = deliveries.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(err) => {
                    tracing::error!(subscription = %self.subscription, error = %err, "delivery failed");
                    continue;
                }
            };

            // Acknowledge as soon as the payload is decoded, regardless of
            // what the handler later makes of it.
            let (payload, acker) = delivery.into_parts();
            let decoded = ChangeEnvelope::decode(&payload);
            if let Err(err) = acker.ack().await {
                tracing::warn!(subscription = %self.subscription, error = %err, "failed to ack");
            }

            let envelope = match decoded {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::warn!(
                        subscription = %self.subscription,
                        error = %err,
                        "undecodable message dropped"
                    );
                    continue;
                }
            };
            if let Some(event) = self.admit(envelope) {
                let handler = self.handler.clone();
                tokio::spawn(dispatch(handler, event));
            }
        }
        tracing::info!(subscription = %self.subscription, "delivery stream closed");
    }

    fn admit(&self, envelope: ChangeEnvelope) -> Option<ChangeEvent> {
        if envelope.model_name != self.model {
            tracing::debug!(
                subscription = %self.subscription,
                model = %envelope.model_name,
                "envelope for another model discarded"
            );
            return None;
        }
        let event = match ChangeEvent::try_from(envelope) {
            Ok(event) => event,
            Err(envelope) => {
                tracing::debug!(
                    subscription = %self.subscription,
                    method = %envelope.method_name,
                    "envelope without model id discarded"
                );
                return None;
            }
        };
        if let Err(err) = actor::admit(event.user_id.as_ref(), self.policy) {
            tracing::error!(
                subscription = %self.subscription,
                model_id = %event.model_id,
                error = %err,
                "change rejected"
            );
            return None;
        }
        Some(event)
    }
}

async fn dispatch(handler: Arc<dyn EventHandler>, event: ChangeEvent) {
    let model = event.model_name.clone();
    let model_id = event.model_id.clone();
    let actor = event.user_id.clone();

    match actor::scope(actor.clone(), handler.handle(actor, event)).await {
        Ok(Ok(())) => tracing::debug!(model = %model, model_id = %model_id, "change handled"),
        Ok(Err(err)) => tracing::error!(
            model = %model,
            model_id = %model_id,
            error = %err,
            "event handler failed"
        ),
        Err(err) => tracing::error!(
            model = %model,
            model_id = %model_id,
            error = %err,
            "change rejected"
        ),
    }
}
