use async_trait::async_trait;
use cdc_relay::{store::memory::MemoryStore, ChangeEvent, EventHandler, Method, UserId};

use crate::model::{Customer, Order, ORDER};

/// Opens a draft order for every customer created upstream.
pub struct OrderCreator {
    store: MemoryStore,
}

impl OrderCreator {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for OrderCreator {
    async fn handle(&self, actor: Option<UserId>, event: ChangeEvent) -> anyhow::Result<()> {
        if event.method_name != Method::Create {
            return Ok(());
        }
        let customer: Customer = serde_json::from_value(event.data)?;
        let order = Order::welcome(event.model_id.as_str());
        let order = self
            .store
            .create(ORDER, serde_json::to_value(order)?, actor)
            .await?;
        tracing::info!(customer = %customer.name, order = %order["id"], "opened welcome order");
        Ok(())
    }
}
