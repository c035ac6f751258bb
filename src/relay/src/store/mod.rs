//! The data-model seam: the store the publisher observes and re-queries.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::envelope::UserId;

pub mod memory;

/// Conjunction of field equalities selecting records of one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate(Map<String, Value>);

impl Predicate {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

/// State shared by the observers of one mutation.
///
/// The store fills in what the operation carries; observers may stash data in
/// `update_data` / `data_before_update` during `before_save` for `after_save`.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub model_name: String,
    /// The single record affected, when the operation targets one.
    pub instance: Option<Value>,
    /// The patch supplied to an update.
    pub data: Option<Value>,
    /// The record as stored before an update by id.
    pub current_instance: Option<Value>,
    /// Selection of a bulk update or delete.
    pub predicate: Option<Predicate>,
    pub is_new_instance: bool,
    /// The user performing the mutation.
    pub actor: Option<UserId>,
    pub update_data: Option<Value>,
    pub data_before_update: Option<Value>,
    /// `id` values of the records a bulk operation selected, captured before it ran.
    pub affected_ids: Option<Vec<Value>>,
}

impl HookContext {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    pub fn with_actor(mut self, actor: Option<UserId>) -> Self {
        self.actor = actor;
        self
    }
}

/// Lifecycle callbacks a store invokes around its mutations.
#[async_trait]
pub trait MutationObserver: Send + Sync + 'static {
    async fn before_save(&self, ctx: &mut HookContext);

    async fn after_save(&self, ctx: &HookContext);

    async fn before_delete(&self, ctx: &HookContext);
}

#[async_trait]
pub trait ModelStore: Send + Sync + 'static {
    fn has_model(&self, model_name: &str) -> bool;

    /// Registers `observer` for every later mutation of `model_name`.
    fn observe(&self, model_name: &str, observer: Arc<dyn MutationObserver>);

    async fn find(&self, model_name: &str, predicate: &Predicate) -> anyhow::Result<Vec<Value>>;
}
