//! Change-data-capture relay: publishes create/update/delete changes of
//! selected models to per-model topics and feeds them to subscribing services.

pub mod actor;
pub mod config;
mod envelope;
pub mod error;
pub mod filter;
pub mod naming;
pub mod publisher;
mod registry;
mod relay;
pub mod store;
pub mod subscriber;
pub mod transport;

pub use config::{ActorPolicy, ClientOptions, RelayOptions, Role, ServerOptions, Settings};
pub use envelope::{ChangeEnvelope, ChangeEvent, Method, ModelId, UserId};
pub use error::{ConfigError, RelayError};
pub use filter::{Filter, FilterChain};
pub use registry::Registry;
pub use relay::Relay;
pub use store::{HookContext, ModelStore, Predicate};
pub use subscriber::EventHandler;
pub use transport::{Connect, Transport};
