use std::{fmt, sync::Arc};

use crate::{error::ConfigError, filter::FilterChain, store::ModelStore, subscriber::EventHandler};

/// Process environment variable scoping every topic and subscription name.
pub const ENVIRONMENT_VAR: &str = "RELAY_ENV";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub environment: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            environment: std::env::var(ENVIRONMENT_VAR)
                .ok()
                .filter(|env| !env.is_empty()),
        }
    }

    pub fn with_environment(environment: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
        }
    }

    pub(crate) fn require_environment(&self) -> Result<&str, ConfigError> {
        self.environment
            .as_deref()
            .ok_or(ConfigError::MissingEnvironment(ENVIRONMENT_VAR))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Server => "server",
            Role::Client => "client",
        })
    }
}

/// Whether inbound envelopes must name the acting user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActorPolicy {
    /// Envelopes without a user id are rejected before the handler runs.
    #[default]
    Required,
    Optional,
}

pub struct ServerOptions {
    pub models_to_broadcast: Vec<String>,
    pub filters: FilterChain,
    pub store: Arc<dyn ModelStore>,
}

impl ServerOptions {
    pub fn new(store: Arc<dyn ModelStore>, models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            models_to_broadcast: models.into_iter().map(Into::into).collect(),
            filters: FilterChain::default(),
            store,
        }
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }
}

pub struct ClientOptions {
    pub models_to_subscribe: Vec<String>,
    pub event_fn: Arc<dyn EventHandler>,
    pub actor_policy: ActorPolicy,
}

impl ClientOptions {
    pub fn new(
        event_fn: impl EventHandler,
        models: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            models_to_subscribe: models.into_iter().map(Into::into).collect(),
            event_fn: Arc::new(event_fn),
            actor_policy: ActorPolicy::default(),
        }
    }

    pub fn with_actor_policy(mut self, actor_policy: ActorPolicy) -> Self {
        self.actor_policy = actor_policy;
        self
    }
}

pub enum RoleOptions {
    Server(ServerOptions),
    Client(ClientOptions),
}

impl RoleOptions {
    pub fn role(&self) -> Role {
        match self {
            RoleOptions::Server(_) => Role::Server,
            RoleOptions::Client(_) => Role::Client,
        }
    }
}

/// Options accepted by [`crate::Registry::get_or_create`].
///
/// Leaving `role` unset only looks up (or reserves) the relay for `service_name`.
pub struct RelayOptions {
    pub service_name: String,
    pub project_id: Option<String>,
    pub role: Option<RoleOptions>,
}

impl RelayOptions {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            project_id: None,
            role: None,
        }
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn server(mut self, options: ServerOptions) -> Self {
        self.role = Some(RoleOptions::Server(options));
        self
    }

    pub fn client(mut self, options: ClientOptions) -> Self {
        self.role = Some(RoleOptions::Client(options));
        self
    }
}
