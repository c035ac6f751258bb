use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{
    config::{ClientOptions, Role, RoleOptions, ServerOptions, Settings},
    envelope::ChangeEnvelope,
    error::{ConfigError, Result},
    publisher::Publisher,
    subscriber::Subscriber,
    transport::{Connect, Transport},
};

/// The relay of one service. Identity fields are written once, by the first
/// configuration that sets a role; the role never changes afterwards.
pub struct Relay<T: Transport> {
    service_name: String,
    environment: OnceLock<String>,
    project_id: OnceLock<String>,
    transport: OnceLock<Arc<T>>,
    role: OnceLock<Role>,
    publisher: OnceLock<Arc<Publisher<T>>>,
    subscriber: OnceLock<Subscriber<T>>,
    configuring: tokio::sync::Mutex<()>,
}

impl<T: Transport> Relay<T> {
    pub(crate) fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            environment: OnceLock::new(),
            project_id: OnceLock::new(),
            transport: OnceLock::new(),
            role: OnceLock::new(),
            publisher: OnceLock::new(),
            subscriber: OnceLock::new(),
            configuring: tokio::sync::Mutex::new(()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.get().map(String::as_str)
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.get().map(String::as_str)
    }

    /// `None` while the relay is an unconfigured placeholder.
    pub fn role(&self) -> Option<Role> {
        self.role.get().copied()
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.get().map(Arc::as_ref)
    }

    pub fn publisher(&self) -> Result<Arc<Publisher<T>>> {
        self.require_role(Role::Server)?;
        self.publisher
            .get()
            .cloned()
            .ok_or_else(|| ConfigError::Unconfigured(self.service_name.clone()).into())
    }

    pub fn broadcast_models(&self) -> Vec<String> {
        self.publisher
            .get()
            .map(|publisher| publisher.models())
            .unwrap_or_default()
    }

    pub fn subscribed_models(&self) -> Vec<String> {
        self.subscriber
            .get()
            .map(|subscriber| subscriber.models())
            .unwrap_or_default()
    }

    /// Publishes a prepared envelope on a server relay.
    pub async fn emit(&self, envelope: ChangeEnvelope) -> Result<()> {
        self.publisher()?.emit(envelope).await
    }

    /// Adds subscriptions to a client relay.
    pub async fn subscribe(&self, options: ClientOptions) -> Result<()> {
        let _guard = self.configuring.lock().await;
        self.require_role(Role::Client)?;
        self.configure_client(options).await
    }

    /// Stops the delivery loops of a client relay. In-flight handlers run to completion.
    pub fn shutdown(&self) {
        if let Some(subscriber) = self.subscriber.get() {
            subscriber.shutdown();
        }
    }

    pub(crate) async fn configure<C>(
        &self,
        connector: &C,
        settings: &Settings,
        project_id: Option<String>,
        options: RoleOptions,
    ) -> Result<()>
    where
        C: Connect<Transport = T>,
    {
        let _guard = self.configuring.lock().await;
        let requested = options.role();

        if let Some(current) = self.role() {
            if current != requested {
                return Err(ConfigError::RoleConflict {
                    service: self.service_name.clone(),
                    current,
                    requested,
                }
                .into());
            }
        }

        let models = match &options {
            RoleOptions::Server(server) => &server.models_to_broadcast,
            RoleOptions::Client(client) => &client.models_to_subscribe,
        };
        if models.is_empty() {
            return Err(ConfigError::NoModels(requested).into());
        }

        if self.role().is_none() {
            let project_id = project_id.ok_or(ConfigError::MissingProjectId(requested))?;
            let environment = settings.require_environment()?.to_owned();
            let transport = connector.connect(&project_id).await?;

            tracing::info!(
                service = %self.service_name,
                %environment,
                project = %project_id,
                role = %requested,
                "relay configured"
            );
            let _ = self.environment.set(environment);
            let _ = self.project_id.set(project_id);
            let _ = self.transport.set(Arc::new(transport));
            let _ = self.role.set(requested);
        }

        match options {
            RoleOptions::Server(server) => self.configure_server(server),
            RoleOptions::Client(client) => self.configure_client(client).await,
        }
    }

    fn configure_server(&self, options: ServerOptions) -> Result<()> {
        let (environment, transport) = self.identity()?;
        let mut created = false;
        let publisher = self.publisher.get_or_init(|| {
            created = true;
            Arc::new(Publisher::new(
                self.service_name.clone(),
                environment,
                transport,
                options.filters.clone(),
            ))
        });
        if !created && !options.filters.is_empty() {
            tracing::debug!(
                service = %self.service_name,
                "filters are already set, ignoring the new ones"
            );
        }
        Publisher::broadcast(publisher, &options.store, &options.models_to_broadcast);
        Ok(())
    }

    async fn configure_client(&self, options: ClientOptions) -> Result<()> {
        if options.models_to_subscribe.is_empty() {
            return Err(ConfigError::NoModels(Role::Client).into());
        }
        let (environment, transport) = self.identity()?;
        let subscriber = self
            .subscriber
            .get_or_init(|| Subscriber::new(self.service_name.clone(), environment, transport));
        subscriber
            .subscribe(
                &options.models_to_subscribe,
                options.event_fn,
                options.actor_policy,
            )
            .await
    }

    fn identity(&self) -> Result<(String, Arc<T>)> {
        match (self.environment.get(), self.transport.get()) {
            (Some(environment), Some(transport)) => Ok((environment.clone(), transport.clone())),
            _ => Err(ConfigError::Unconfigured(self.service_name.clone()).into()),
        }
    }

    fn require_role(&self, requested: Role) -> Result<()> {
        match self.role() {
            Some(current) if current == requested => Ok(()),
            Some(current) => Err(ConfigError::RoleConflict {
                service: self.service_name.clone(),
                current,
                requested,
            }
            .into()),
            None => Err(ConfigError::Unconfigured(self.service_name.clone()).into()),
        }
    }
}

impl<T: Transport> fmt::Debug for Relay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("service_name", &self.service_name)
            .field("environment", &self.environment())
            .field("role", &self.role())
            .finish_non_exhaustive()
    }
}
