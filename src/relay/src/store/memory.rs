//! Map-backed model store that runs observers around its mutations like an ORM
//! would: `before_save`/`after_save` around create and update, `before_delete`
//! before removal.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::{HookContext, ModelStore, MutationObserver, Predicate};
use crate::envelope::{ModelId, UserId, ID_FIELD};

#[derive(Clone, Default)]
pub struct MemoryStore {
    models: Arc<RwLock<HashMap<String, Table>>>,
}

#[derive(Default)]
struct Table {
    rows: BTreeMap<String, Value>,
    observers: Vec<Arc<dyn MutationObserver>>,
    failing_queries: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, model_name: impl Into<String>) -> &Self {
        self.models.write().entry(model_name.into()).or_default();
        self
    }

    /// Makes every `find` on `model_name` fail while set.
    pub fn fail_queries(&self, model_name: &str, fail: bool) {
        if let Some(table) = self.models.write().get_mut(model_name) {
            table.failing_queries = fail;
        }
    }

    pub fn all(&self, model_name: &str) -> Vec<Value> {
        self.models
            .read()
            .get(model_name)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, model_name: &str, id: &str) -> Option<Value> {
        self.models.read().get(model_name)?.rows.get(id).cloned()
    }

    /// Inserts `data`, assigning a fresh id when it carries none.
    pub async fn create(
        &self,
        model_name: &str,
        mut data: Value,
        actor: Option<UserId>,
    ) -> anyhow::Result<Value> {
        anyhow::ensure!(data.is_object(), "record must be a JSON object");
        let id = match ModelId::from_record(&data) {
            Some(id) => id,
            None => {
                let id = ModelId::from(Uuid::new_v4());
                data[ID_FIELD] = Value::String(id.to_string());
                id
            }
        };

        let observers = self.observers(model_name)?;
        let mut ctx = HookContext::new(model_name).with_actor(actor);
        ctx.instance = Some(data.clone());
        ctx.is_new_instance = true;
        for observer in &observers {
            observer.before_save(&mut ctx).await;
        }

        self.with_table(model_name, |table| {
            table.rows.insert(id.to_string(), data.clone());
        })?;

        for observer in &observers {
            observer.after_save(&ctx).await;
        }
        Ok(data)
    }

    /// Merges `patch` into the record with `id`.
    pub async fn update(
        &self,
        model_name: &str,
        id: &str,
        patch: Value,
        actor: Option<UserId>,
    ) -> anyhow::Result<Value> {
        let current = self
            .get(model_name, id)
            .with_context(|| format!("{model_name} `{id}` not found"))?;

        let observers = self.observers(model_name)?;
        let mut ctx = HookContext::new(model_name).with_actor(actor);
        ctx.data = Some(patch.clone());
        ctx.current_instance = Some(current.clone());
        ctx.predicate = Some(Predicate::eq(ID_FIELD, id));
        for observer in &observers {
            observer.before_save(&mut ctx).await;
        }

        let mut updated = current;
        merge(&mut updated, &patch);
        self.with_table(model_name, |table| {
            table.rows.insert(id.to_owned(), updated.clone());
        })?;

        ctx.instance = Some(updated.clone());
        for observer in &observers {
            observer.after_save(&ctx).await;
        }
        Ok(updated)
    }

    /// Merges `patch` into every record matching `predicate`; returns how many changed.
    pub async fn update_all(
        &self,
        model_name: &str,
        predicate: Predicate,
        patch: Value,
        actor: Option<UserId>,
    ) -> anyhow::Result<usize> {
        let observers = self.observers(model_name)?;
        let mut ctx = HookContext::new(model_name).with_actor(actor);
        ctx.data = Some(patch.clone());
        ctx.predicate = Some(predicate.clone());
        for observer in &observers {
            observer.before_save(&mut ctx).await;
        }

        let count = self.with_table(model_name, |table| {
            let mut count = 0;
            for record in table.rows.values_mut().filter(|r| predicate.matches(r)) {
                merge(record, &patch);
                count += 1;
            }
            count
        })?;

        for observer in &observers {
            observer.after_save(&ctx).await;
        }
        Ok(count)
    }

    pub async fn delete(&self, model_name: &str, id: &str, actor: Option<UserId>) -> anyhow::Result<bool> {
        let Some(current) = self.get(model_name, id) else {
            return Ok(false);
        };

        let observers = self.observers(model_name)?;
        let mut ctx = HookContext::new(model_name).with_actor(actor);
        ctx.instance = Some(current);
        ctx.predicate = Some(Predicate::eq(ID_FIELD, id));
        for observer in &observers {
            observer.before_delete(&ctx).await;
        }

        self.with_table(model_name, |table| table.rows.remove(id).is_some())
    }

    /// Removes every record matching `predicate`; returns how many were removed.
    pub async fn delete_all(
        &self,
        model_name: &str,
        predicate: Predicate,
        actor: Option<UserId>,
    ) -> anyhow::Result<usize> {
        let observers = self.observers(model_name)?;
        let mut ctx = HookContext::new(model_name).with_actor(actor);
        ctx.predicate = Some(predicate.clone());
        for observer in &observers {
            observer.before_delete(&ctx).await;
        }

        self.with_table(model_name, |table| {
            let before = table.rows.len();
            table.rows.retain(|_, record| !predicate.matches(record));
            before - table.rows.len()
        })
    }

    fn observers(&self, model_name: &str) -> anyhow::Result<Vec<Arc<dyn MutationObserver>>> {
        self.with_table(model_name, |table| table.observers.clone())
    }

    fn with_table<R>(&self, model_name: &str, f: impl FnOnce(&mut Table) -> R) -> anyhow::Result<R> {
        let mut models = self.models.write();
        let table = models
            .get_mut(model_name)
            .with_context(|| format!("unknown model `{model_name}`"))?;
        Ok(f(table))
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    fn has_model(&self, model_name: &str) -> bool {
        self.models.read().contains_key(model_name)
    }

    fn observe(&self, model_name: &str, observer: Arc<dyn MutationObserver>) {
        if let Some(table) = self.models.write().get_mut(model_name) {
            table.observers.push(observer);
        }
    }

    async fn find(&self, model_name: &str, predicate: &Predicate) -> anyhow::Result<Vec<Value>> {
        let models = self.models.read();
        let table = models
            .get(model_name)
            .with_context(|| format!("unknown model `{model_name}`"))?;
        anyhow::ensure!(!table.failing_queries, "query on `{model_name}` failed");
        Ok(table
            .rows
            .values()
            .filter(|record| predicate.matches(record))
            .cloned()
            .collect())
    }
}

/// Shallow JSON merge: top-level fields of `patch` replace those of `record`.
fn merge(record: &mut Value, patch: &Value) {
    if let (Some(record), Some(patch)) = (record.as_object_mut(), patch.as_object()) {
        for (field, value) in patch {
            record.insert(field.clone(), value.clone());
        }
    }
}
