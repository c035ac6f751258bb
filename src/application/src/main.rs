use std::{sync::Arc, time::Duration};

use amqp::AmqpConnector;
use application::{
    handler::OrderCreator,
    model::{Customer, CUSTOMER, ORDER},
};
use cdc_relay::{
    store::memory::MemoryStore, subscriber::LogHandler,
    transport::{memory::MemoryBus, Connect},
    ClientOptions, RelayOptions, Registry, ServerOptions, UserId,
};
use tracing_subscriber::EnvFilter;

const PROJECT_VAR: &str = "RELAY_PROJECT";
const DEFAULT_PROJECT: &str = "demo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let project_id =
        std::env::var(PROJECT_VAR).unwrap_or_else(|_| DEFAULT_PROJECT.to_owned());

    match std::env::var(amqp::URI_VAR) {
        Ok(uri) => run(AmqpConnector::new(uri), &project_id).await,
        Err(_) => {
            tracing::info!("{} not set, using the in-process bus", amqp::URI_VAR);
            run(MemoryBus::new(), &project_id).await
        }
    }
}

async fn run<C: Connect>(connector: C, project_id: &str) -> anyhow::Result<()> {
    let registry = Registry::new(connector);

    let store = MemoryStore::new();
    store.define(CUSTOMER).define(ORDER);

    registry
        .get_or_create(
            RelayOptions::new("customers")
                .project(project_id)
                .server(ServerOptions::new(Arc::new(store.clone()), [CUSTOMER])),
        )
        .await?;
    registry
        .get_or_create(
            RelayOptions::new("orders")
                .project(project_id)
                .client(ClientOptions::new(OrderCreator::new(store.clone()), [CUSTOMER])),
        )
        .await?;
    registry
        .get_or_create(
            RelayOptions::new("audit")
                .project(project_id)
                .client(ClientOptions::new(LogHandler, [CUSTOMER])),
        )
        .await?;

    let customer = Customer {
        id: None,
        name: "James Bond".into(),
        email: Some("007@mi6.gov.uk".into()),
    };
    store
        .create(
            CUSTOMER,
            serde_json::to_value(customer)?,
            Some(UserId::from("m")),
        )
        .await?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    for order in store.all(ORDER) {
        tracing::info!(%order, "order on file");
    }

    for service in registry.service_names() {
        if let Some(relay) = registry.lookup(&service) {
            relay.shutdown();
        }
    }
    Ok(())
}
