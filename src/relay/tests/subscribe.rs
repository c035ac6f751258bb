mod common;

use std::{panic::AssertUnwindSafe, time::Duration};

use bytes::Bytes;
use cdc_relay::{
    actor,
    transport::{memory::MemoryBus, Transport},
    ActorPolicy, ChangeEnvelope, ChangeEvent, ClientOptions, ConfigError, EventHandler, Method,
    ModelId, RelayError, RelayOptions, Role, UserId,
};
use futures::FutureExt;
use common::*;
use serde_json::json;
use tokio::sync::mpsc;

fn subscription(service: &str, model: &str) -> String {
    format!("{ENV}__{service}__{model}")
}

async fn publish_raw(bus: &MemoryBus, model: &str, payload: Bytes) {
    let topic = bus.ensure_topic(&topic(model)).await.unwrap();
    bus.publish(&topic, payload).await.unwrap();
}

async fn publish(bus: &MemoryBus, envelope: &ChangeEnvelope) {
    publish_raw(bus, &envelope.model_name, envelope.encode().unwrap()).await;
}

fn customer(id: &str, user_id: Option<UserId>) -> ChangeEnvelope {
    ChangeEnvelope::for_record(CUSTOMER, Method::Create, &json!({"id": id, "name": "James Bond"}))
        .unwrap()
        .with_user_id(user_id)
}

async fn wait_for_acks(bus: &MemoryBus, subscription: &str, n: usize) {
    let wait = async {
        while bus.acked(subscription) < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("messages were not acknowledged");
}

#[tokio::test]
async fn handler_receives_event_and_actor() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let (options, mut rx) = recording_client(&[CUSTOMER]);
    client(&registry, "orders", options).await;

    publish(&bus, &customer("42", user("m"))).await;

    let seen = next(&mut rx).await;
    assert_eq!(seen.event.model_name, CUSTOMER);
    assert_eq!(seen.event.method_name, Method::Create);
    assert_eq!(seen.event.model_id, ModelId::from("42"));
    assert_eq!(seen.event.data["name"], "James Bond");
    assert_eq!(seen.actor, user("m"));
    assert_eq!(seen.ambient_actor, user("m"));
    assert_eq!(seen.event.user_id, user("m"));
}

#[tokio::test]
async fn foreign_and_anonymous_envelopes_are_discarded() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let (options, mut rx) = recording_client(&[CUSTOMER]);
    client(&registry, "orders", options).await;

    let mut foreign = customer("1", user("m"));
    foreign.model_name = ORDER.into();
    publish_raw(&bus, CUSTOMER, foreign.encode().unwrap()).await;

    let mut without_id = customer("2", user("m"));
    without_id.model_id = None;
    publish(&bus, &without_id).await;

    publish(&bus, &customer("3", None)).await;
    publish_raw(&bus, CUSTOMER, Bytes::from_static(b"not json")).await;
    publish(&bus, &customer("4", user("m"))).await;

    assert_eq!(next(&mut rx).await.event.model_id, ModelId::from("4"));
    assert_quiet(&mut rx).await;
    wait_for_acks(&bus, &subscription("orders", CUSTOMER), 5).await;
}

#[tokio::test]
async fn optional_actor_policy_admits_anonymous_changes() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let (options, mut rx) = recording_client(&[CUSTOMER]);
    client(&registry, "orders", options.with_actor_policy(ActorPolicy::Optional)).await;

    publish(&bus, &customer("1", None)).await;

    let seen = next(&mut rx).await;
    assert_eq!(seen.actor, None);
    assert_eq!(seen.ambient_actor, None);
}

#[tokio::test]
async fn ack_does_not_wait_for_the_handler() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let (release, released) = tokio::sync::watch::channel(false);
    let handler = move |_: Option<UserId>, _: ChangeEvent| {
        let mut released = released.clone();
        async move {
            released.changed().await?;
            Err::<(), _>(anyhow::anyhow!("handler gave up"))
        }
    };
    client(&registry, "orders", ClientOptions::new(handler, [CUSTOMER])).await;

    publish(&bus, &customer("1", user("m"))).await;
    publish(&bus, &customer("2", user("m"))).await;

    wait_for_acks(&bus, &subscription("orders", CUSTOMER), 2).await;
    release.send(true).unwrap();
}

#[tokio::test]
async fn actor_is_cleared_after_a_failing_handler() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = move |actor: Option<UserId>, event: ChangeEvent| {
        let tx = tx.clone();
        async move {
            tx.send((event.model_id.clone(), actor::current()))?;
            anyhow::ensure!(actor.is_none(), "refusing changes made by {actor:?}");
            Ok::<(), anyhow::Error>(())
        }
    };
    client(
        &registry,
        "orders",
        ClientOptions::new(handler, [CUSTOMER]).with_actor_policy(ActorPolicy::Optional),
    )
    .await;

    publish(&bus, &customer("1", user("m"))).await;
    assert_eq!(next(&mut rx).await, (ModelId::from("1"), user("m")));

    publish(&bus, &customer("2", None)).await;
    assert_eq!(next(&mut rx).await, (ModelId::from("2"), None));
}

#[tokio::test]
async fn actor_scope_ends_with_the_handler() {
    let failing = |actor: Option<UserId>, _: ChangeEvent| async move {
        anyhow::ensure!(actor::current() == actor, "actor not installed");
        Err::<(), _>(anyhow::anyhow!("handler failed"))
    };
    let event = ChangeEvent::try_from(customer("1", user("m"))).unwrap();
    let outcome = actor::scope(user("m"), failing.handle(user("m"), event.clone())).await;
    assert!(matches!(outcome, Ok(Err(_))));
    assert_eq!(actor::current(), None);

    let panicking = |_: Option<UserId>, _: ChangeEvent| async move {
        if actor::current().is_some() {
            panic!("handler blew up");
        }
        Ok::<(), anyhow::Error>(())
    };
    let outcome = AssertUnwindSafe(actor::scope(user("m"), panicking.handle(user("m"), event)))
        .catch_unwind()
        .await;
    assert!(outcome.is_err());
    assert_eq!(actor::current(), None);
}

#[tokio::test]
async fn setup_stops_at_the_first_failing_model() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    bus.reject_topic(topic(ORDER));

    let (options, _rx) = recording_client(&[CUSTOMER, ORDER, "Invoice"]);
    let err = registry
        .get_or_create(RelayOptions::new("billing").project(PROJECT).client(options))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Transport(_)));

    let relay = registry.lookup("billing").unwrap();
    assert_eq!(relay.subscribed_models(), vec![CUSTOMER]);
    assert_eq!(bus.subscriptions(&topic(CUSTOMER)), vec![subscription("billing", CUSTOMER)]);
    assert!(!bus.topics().contains(&topic("Invoice")));
}

#[tokio::test]
async fn subscribing_to_no_models_is_rejected() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let (options, _rx) = recording_client(&[CUSTOMER]);
    let relay = client(&registry, "orders", options).await;

    let (empty, _rx) = recording_client(&[]);
    assert!(matches!(
        relay.subscribe(empty).await,
        Err(RelayError::Config(ConfigError::NoModels(Role::Client)))
    ));
    assert_eq!(relay.subscribed_models(), vec![CUSTOMER]);
}

#[tokio::test]
async fn reconfiguring_adds_only_new_models() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let (options, mut rx) = recording_client(&[CUSTOMER]);
    let relay = client(&registry, "orders", options).await;

    let (again, mut order_rx) = recording_client(&[CUSTOMER, ORDER]);
    relay.subscribe(again).await.unwrap();
    assert_eq!(relay.subscribed_models(), vec![CUSTOMER, ORDER]);

    publish(&bus, &customer("1", user("m"))).await;
    let order = ChangeEnvelope::for_record(ORDER, Method::Update, &json!({"id": "9"}))
        .unwrap()
        .with_user_id(user("m"));
    publish(&bus, &order).await;

    assert_eq!(next(&mut rx).await.event.model_id, ModelId::from("1"));
    assert_eq!(next(&mut order_rx).await.event.model_id, ModelId::from("9"));
    assert_quiet(&mut rx).await;
    assert_quiet(&mut order_rx).await;
}

#[tokio::test]
async fn shutdown_stops_delivery() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let (options, mut rx) = recording_client(&[CUSTOMER]);
    let relay = client(&registry, "orders", options).await;

    relay.shutdown();
    tokio::task::yield_now().await;
    publish(&bus, &customer("1", user("m"))).await;

    assert_quiet(&mut rx).await;
    assert_eq!(bus.acked(&subscription("orders", CUSTOMER)), 0);
}

#[tokio::test]
async fn subscribe_requires_a_client_relay() {
    let bus = MemoryBus::new();
    let registry = registry(&bus);
    let relay = registry.create("orders").unwrap();

    let (options, _rx) = recording_client(&[CUSTOMER]);
    assert!(matches!(
        relay.subscribe(options).await,
        Err(RelayError::Config(ConfigError::Unconfigured(_)))
    ));
}
