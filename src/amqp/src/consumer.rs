use bytes::Bytes;
use cdc_relay::transport::{Acknowledge, Deliveries, Delivery};
use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
};

/// Unacknowledged messages the broker may push to one consumer.
const PREFETCH: u16 = 32;

struct AmqpAck(Acker);

impl Acknowledge for AmqpAck {
    fn ack(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        async move {
            self.0.ack(BasicAckOptions::default()).await?;
            Ok(())
        }
        .boxed()
    }
}

fn into_delivery(delivery: lapin::message::Delivery) -> Delivery {
    Delivery::new(Bytes::from(delivery.data), AmqpAck(delivery.acker))
}

/// Consumes `queue` on a channel of its own. The channel lives as long as the stream.
pub async fn consume(connection: &lapin::Connection, queue: &str) -> anyhow::Result<Deliveries> {
    let channel = connection.create_channel().await?;
    channel
        .basic_qos(PREFETCH, BasicQosOptions::default())
        .await?;
    let consumer = channel
        .basic_consume(
            queue,
            queue,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    tracing::debug!(queue, "consumer started");

    let deliveries = stream::unfold((channel, consumer), |(channel, mut consumer)| async move {
        let delivery = consumer.next().await?;
        let delivery = delivery.map(into_delivery).map_err(anyhow::Error::from);
        Some((delivery, (channel, consumer)))
    });
    Ok(deliveries.boxed())
}
