use amqp::{AmqpConnector, DEFAULT_URI};
use rand::Rng;

const MANAGEMENT_API: &str = "http://localhost:15672/api";

/// A fresh virtual host per test, so runs never see each other's queues.
pub struct TestContext {
    pub connector: AmqpConnector,
    pub project_id: String,
}

impl TestContext {
    pub async fn new() -> Self {
        let project_id = format!(
            "x{}",
            rand::thread_rng()
                .sample_iter(rand::distributions::Alphanumeric)
                .take(10)
                .map(char::from)
                .collect::<String>()
        )
        .to_lowercase();

        reqwest::Client::new()
            .put(format!("{MANAGEMENT_API}/vhosts/{project_id}"))
            .basic_auth("guest", Some("guest"))
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap();

        Self {
            connector: AmqpConnector::new(DEFAULT_URI),
            project_id,
        }
    }
}
