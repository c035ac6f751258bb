use std::future::Future;

use async_trait::async_trait;

use crate::envelope::{ChangeEvent, UserId};

/// Receives the changes a client relay subscribed to.
///
/// `actor` is the user who caused the change, as captured by the publisher.
/// It is also readable through [`crate::actor::current`] while `handle` runs.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, actor: Option<UserId>, event: ChangeEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Option<UserId>, ChangeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, actor: Option<UserId>, event: ChangeEvent) -> anyhow::Result<()> {
        self(actor, event).await
    }
}

/// Logs every event it receives.
pub struct LogHandler;

#[async_trait]
impl EventHandler for LogHandler {
    async fn handle(&self, actor: Option<UserId>, event: ChangeEvent) -> anyhow::Result<()> {
        tracing::info!(
            model = %event.model_name,
            method = %event.method_name,
            model_id = %event.model_id,
            actor = ?actor,
            "change received"
        );
        Ok(())
    }
}
