use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    BasicProperties,
};

const CONTENT_TYPE: &str = "application/json";
const PERSISTENT: u8 = 2;

/// Publishes change envelopes to fanout exchanges on a dedicated channel.
pub struct AmqpPublisher {
    channel: lapin::Channel,
    config: PublisherConfiguration,
}

impl AmqpPublisher {
    pub async fn new(connection: &lapin::Connection) -> anyhow::Result<Self> {
        Self::new_with(connection, PublisherConfiguration::default()).await
    }

    pub async fn new_with(
        connection: &lapin::Connection,
        config: PublisherConfiguration,
    ) -> anyhow::Result<Self> {
        let channel = connection.create_channel().await?;
        if config.publisher_confirmation {
            channel
                .confirm_select(ConfirmSelectOptions { nowait: false })
                .await?;
        }
        Ok(Self { channel, config })
    }

    pub async fn publish(&self, exchange: &str, payload: &[u8]) -> anyhow::Result<()> {
        let properties = BasicProperties::default()
            .with_content_type(CONTENT_TYPE.into())
            .with_delivery_mode(PERSISTENT);
        let confirmation = self
            .channel
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?;

        if self.config.publisher_confirmation {
            let confirmation = confirmation.await?;
            anyhow::ensure!(
                confirmation.is_ack(),
                "broker refused message for exchange `{exchange}`"
            );
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PublisherConfiguration {
    pub publisher_confirmation: bool,
}

impl Default for PublisherConfiguration {
    fn default() -> Self {
        Self {
            publisher_confirmation: true,
        }
    }
}

impl PublisherConfiguration {
    pub fn with_confirmation(mut self, publisher_confirmation: bool) -> Self {
        self.publisher_confirmation = publisher_confirmation;
        self
    }
}
