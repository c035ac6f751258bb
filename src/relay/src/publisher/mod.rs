//! Server side: turns observed mutations into envelopes on the bus.

use std::{collections::BTreeSet, sync::Arc};

use parking_lot::RwLock;
use serde_json::Value;

use crate::{
    envelope::{ChangeEnvelope, Method},
    error::{RelayError, Result},
    filter::FilterChain,
    naming,
    store::{HookContext, ModelStore},
    transport::Transport,
};

mod hooks;

use hooks::StoreObserver;

pub struct Publisher<T: Transport> {
    service_name: String,
    environment: String,
    transport: Arc<T>,
    filters: FilterChain,
    models: RwLock<BTreeSet<String>>,
}

impl<T: Transport> Publisher<T> {
    pub(crate) fn new(
        service_name: String,
        environment: String,
        transport: Arc<T>,
        filters: FilterChain,
    ) -> Self {
        Self {
            service_name,
            environment,
            transport,
            filters,
            models: RwLock::default(),
        }
    }

    pub fn models(&self) -> Vec<String> {
        self.models.read().iter().cloned().collect()
    }

    /// Observes every model of `models` the store knows about. Models already
    /// broadcast are left alone.
    pub(crate) fn broadcast(this: &Arc<Self>, store: &Arc<dyn ModelStore>, models: &[String]) {
        for model in models {
            if !store.has_model(model) {
                tracing::warn!(
                    service = %this.service_name,
                    model = %model,
                    "model not found in store, it will not be broadcast"
                );
                continue;
            }
            if !this.models.write().insert(model.clone()) {
                continue;
            }
            store.observe(
                model,
                Arc::new(StoreObserver {
                    publisher: this.clone(),
                    store: store.clone(),
                }),
            );
            tracing::debug!(service = %this.service_name, model = %model, "broadcasting model");
        }
    }

    /// Publishes `envelope` to its model's topic.
    pub async fn emit(&self, envelope: ChangeEnvelope) -> Result<()> {
        if !envelope.has_model_id() {
            return Err(RelayError::MissingModelId(envelope.model_name));
        }
        let topic =
            naming::resolve_topic(self.transport.as_ref(), &self.environment, &envelope.model_name)
                .await?;
        let payload = envelope.encode()?;
        self.transport.publish(&topic, payload).await?;

        tracing::debug!(
            service = %self.service_name,
            topic = %topic.name,
            method = %envelope.method_name,
            model_id = ?envelope.model_id,
            "envelope published"
        );
        Ok(())
    }

    /// Publishes every envelope concurrently, logging the ones that fail.
    pub(crate) async fn emit_all(&self, envelopes: Vec<ChangeEnvelope>) {
        let publishes = envelopes.into_iter().map(|envelope| async move {
            let model = envelope.model_name.clone();
            let model_id = envelope.model_id.clone();
            if let Err(err) = self.emit(envelope).await {
                tracing::error!(
                    service = %self.service_name,
                    model = %model,
                    model_id = ?model_id,
                    error = %err,
                    "failed to publish change"
                );
            }
        });
        futures::future::join_all(publishes).await;
    }

    /// Builds the envelope of one record, unless it has no id or a filter vetoes it.
    pub(crate) fn envelope(
        &self,
        method: Method,
        record: &Value,
        ctx: &HookContext,
    ) -> Option<ChangeEnvelope> {
        if !self.filters.allows(&ctx.model_name, method, record, ctx) {
            tracing::debug!(
                service = %self.service_name,
                model = %ctx.model_name,
                %method,
                "change filtered out"
            );
            return None;
        }
        let envelope = ChangeEnvelope::for_record(&ctx.model_name, method, record);
        if envelope.is_none() {
            tracing::debug!(model = %ctx.model_name, %method, "record has no id, dropping change");
        }
        Some(
            envelope?
                .with_update_data(ctx.update_data.clone())
                .with_data_before_update(ctx.data_before_update.clone())
                .with_user_id(ctx.actor.clone()),
        )
    }
}
