use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    config::{RelayOptions, Settings},
    error::{ConfigError, Result},
    relay::Relay,
    transport::Connect,
};

type SettingsSource = Box<dyn Fn() -> Settings + Send + Sync>;

/// Owns at most one [`Relay`] per service name.
pub struct Registry<C: Connect> {
    connector: C,
    settings: SettingsSource,
    relays: Mutex<HashMap<String, Arc<Relay<C::Transport>>>>,
}

impl<C: Connect> Registry<C> {
    /// Reads [`Settings`] from the process environment whenever a relay is configured.
    pub fn new(connector: C) -> Self {
        Self::with_settings(connector, Settings::from_env)
    }

    pub fn with_settings(connector: C, settings: impl Fn() -> Settings + Send + Sync + 'static) -> Self {
        Self {
            connector,
            settings: Box::new(settings),
            relays: Mutex::default(),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the relay of `service_name`, reserving an unconfigured one if there is none.
    pub fn create(&self, service_name: &str) -> Result<Arc<Relay<C::Transport>>> {
        if service_name.is_empty() {
            return Err(ConfigError::MissingServiceName.into());
        }
        let relay = self
            .relays
            .lock()
            .entry(service_name.to_owned())
            .or_insert_with(|| {
                tracing::debug!(service = service_name, "relay created");
                Arc::new(Relay::new(service_name))
            })
            .clone();
        Ok(relay)
    }

    pub fn lookup(&self, service_name: &str) -> Option<Arc<Relay<C::Transport>>> {
        self.relays.lock().get(service_name).cloned()
    }

    /// Creates or fetches the relay named by `options`, then applies its role
    /// options if any. Later calls merge into the existing relay; the
    /// environment, project and role of the first configuration are kept.
    pub async fn get_or_create(&self, options: RelayOptions) -> Result<Arc<Relay<C::Transport>>> {
        let relay = self.create(&options.service_name)?;
        if let Some(role) = options.role {
            let settings = (self.settings)();
            relay
                .configure(&self.connector, &settings, options.project_id, role)
                .await?;
        }
        Ok(relay)
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.relays.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
