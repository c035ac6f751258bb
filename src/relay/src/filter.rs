use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use serde_json::Value;

use crate::{envelope::Method, store::HookContext};

/// Decides whether the change of one record may be published.
pub trait Filter: Send + Sync + 'static {
    fn should_publish(
        &self,
        model_name: &str,
        method: Method,
        record: &Value,
        ctx: &HookContext,
    ) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&str, Method, &Value, &HookContext) -> bool + Send + Sync + 'static,
{
    fn should_publish(
        &self,
        model_name: &str,
        method: Method,
        record: &Value,
        ctx: &HookContext,
    ) -> bool {
        self(model_name, method, record, ctx)
    }
}

/// Ordered filters; a record is published only if none of them vetoes it.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl Filter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs every filter in order. A filter that panics counts as a pass.
    pub fn allows(&self, model_name: &str, method: Method, record: &Value, ctx: &HookContext) -> bool {
        let mut allowed = true;
        for (position, filter) in self.filters.iter().enumerate() {
            let verdict = catch_unwind(AssertUnwindSafe(|| {
                filter.should_publish(model_name, method, record, ctx)
            }));
            match verdict {
                Ok(pass) => allowed &= pass,
                Err(_) => tracing::warn!(
                    model = model_name,
                    %method,
                    position,
                    "filter panicked, treating it as a pass"
                ),
            }
        }
        allowed
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("len", &self.filters.len())
            .finish()
    }
}

impl<F: Filter> FromIterator<F> for FilterChain {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self {
            filters: iter
                .into_iter()
                .map(|filter| Arc::new(filter) as Arc<dyn Filter>)
                .collect(),
        }
    }
}
