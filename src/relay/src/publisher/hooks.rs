use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::Publisher;
use crate::{
    envelope::{Method, ModelId, ID_FIELD},
    store::{HookContext, ModelStore, MutationObserver, Predicate},
    transport::Transport,
};

/// Hooks one publisher into the lifecycle of one store's models.
pub(super) struct StoreObserver<T: Transport> {
    pub(super) publisher: Arc<Publisher<T>>,
    pub(super) store: Arc<dyn ModelStore>,
}

impl<T: Transport> StoreObserver<T> {
    async fn query(&self, ctx: &HookContext, predicate: &Predicate) -> Vec<Value> {
        match self.store.find(&ctx.model_name, predicate).await {
            Ok(records) => records,
            Err(err) => {
                tracing::error!(
                    model = %ctx.model_name,
                    error = %err,
                    "failed to query affected records"
                );
                Vec::new()
            }
        }
    }

    /// Re-reads the records a bulk operation touches. Errors are logged and
    /// yield no records, so the mutation itself goes ahead.
    async fn affected(&self, ctx: &HookContext) -> Vec<Value> {
        if let Some(ids) = &ctx.affected_ids {
            let reads = ids.iter().map(|id| async move {
                self.query(ctx, &Predicate::eq(ID_FIELD, id.clone())).await
            });
            return futures::future::join_all(reads)
                .await
                .into_iter()
                .flatten()
                .collect();
        }
        match &ctx.predicate {
            Some(predicate) => self.query(ctx, predicate).await,
            None => Vec::new(),
        }
    }

    async fn publish_records(&self, method: Method, records: &[Value], ctx: &HookContext) {
        let envelopes = records
            .iter()
            .filter_map(|record| self.publisher.envelope(method, record, ctx))
            .collect();
        self.publisher.emit_all(envelopes).await;
    }
}

fn identified(instance: &Option<Value>) -> Option<&Value> {
    instance
        .as_ref()
        .filter(|instance| ModelId::from_record(instance).is_some())
}

#[async_trait]
impl<T: Transport> MutationObserver for StoreObserver<T> {
    async fn before_save(&self, ctx: &mut HookContext) {
        if ctx.update_data.is_none() {
            ctx.update_data = ctx.data.clone().or_else(|| ctx.instance.clone());
        }
        if ctx.data_before_update.is_none() {
            ctx.data_before_update = ctx.current_instance.clone();
        }

        // The update may rewrite the fields its predicate selects on; pin the
        // selection to ids first.
        let bulk = ctx.instance.is_none() && ctx.current_instance.is_none();
        if bulk && ctx.predicate.is_some() && ctx.affected_ids.is_none() {
            let records = self.affected(ctx).await;
            ctx.affected_ids = Some(
                records
                    .iter()
                    .filter_map(|record| record.get(ID_FIELD).cloned())
                    .collect(),
            );
        }
    }

    async fn after_save(&self, ctx: &HookContext) {
        let method = if ctx.is_new_instance {
            Method::Create
        } else {
            Method::Update
        };

        match identified(&ctx.instance) {
            Some(instance) => {
                self.publish_records(method, std::slice::from_ref(instance), ctx)
                    .await;
            }
            None => {
                let records = self.affected(ctx).await;
                self.publish_records(method, &records, ctx).await;
            }
        }
    }

    async fn before_delete(&self, ctx: &HookContext) {
        let records = match identified(&ctx.instance) {
            Some(instance) => vec![instance.clone()],
            None => self.affected(ctx).await,
        };
        self.publish_records(Method::Delete, &records, ctx).await;
    }
}
