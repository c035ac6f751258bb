#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use cdc_relay::{
    actor,
    store::memory::MemoryStore,
    transport::memory::MemoryBus,
    ChangeEvent, ClientOptions, FilterChain, RelayOptions, Registry, Relay, ServerOptions,
    Settings, UserId,
};
use tokio::sync::mpsc;

pub const ENV: &str = "test";
pub const PROJECT: &str = "test-project";
pub const CUSTOMER: &str = "Customer";
pub const ORDER: &str = "Order";

pub type MemoryRelay = Arc<Relay<MemoryBus>>;

/// Routes relay logs through the test harness; set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn registry(bus: &MemoryBus) -> Registry<MemoryBus> {
    init_tracing();
    Registry::with_settings(bus.clone(), || Settings::with_environment(ENV))
}

pub fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store.define(CUSTOMER).define(ORDER);
    store
}

pub fn topic(model: &str) -> String {
    format!("{ENV}__{model}")
}

pub async fn server(
    registry: &Registry<MemoryBus>,
    store: &MemoryStore,
    service: &str,
    models: &[&str],
    filters: FilterChain,
) -> MemoryRelay {
    registry
        .get_or_create(
            RelayOptions::new(service).project(PROJECT).server(
                ServerOptions::new(Arc::new(store.clone()), models.iter().copied())
                    .with_filters(filters),
            ),
        )
        .await
        .unwrap()
}

/// What a recording handler saw for one event.
#[derive(Debug, Clone)]
pub struct Seen {
    pub actor: Option<UserId>,
    pub ambient_actor: Option<UserId>,
    pub event: ChangeEvent,
}

/// Client options whose handler forwards every event to the returned receiver.
pub fn recording_client(models: &[&str]) -> (ClientOptions, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |actor: Option<UserId>, event: ChangeEvent| {
        let tx = tx.clone();
        async move {
            let seen = Seen {
                actor,
                ambient_actor: actor::current(),
                event,
            };
            tx.send(seen).map_err(|_| anyhow::anyhow!("test receiver dropped"))
        }
    };
    (ClientOptions::new(handler, models.iter().copied()), rx)
}

pub async fn client(
    registry: &Registry<MemoryBus>,
    service: &str,
    options: ClientOptions,
) -> MemoryRelay {
    registry
        .get_or_create(RelayOptions::new(service).project(PROJECT).client(options))
        .await
        .unwrap()
}

pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("channel closed")
}

/// Asserts nothing more arrives within a short grace period.
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(extra)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        panic!("unexpected event: {extra:?}");
    }
}

pub fn user(id: &str) -> Option<UserId> {
    Some(UserId::from(id))
}
