use crate::config::Role;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("service name must not be empty")]
    MissingServiceName,
    #[error("environment setting `{0}` is not set")]
    MissingEnvironment(&'static str),
    #[error("a project id is required to configure a {0} relay")]
    MissingProjectId(Role),
    #[error("at least one model is required to configure a {0} relay")]
    NoModels(Role),
    #[error("relay `{service}` is already a {current}, it cannot become a {requested}")]
    RoleConflict {
        service: String,
        current: Role,
        requested: Role,
    },
    #[error("relay `{0}` has not been configured")]
    Unconfigured(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("actor context already holds `{0}`")]
    AlreadySet(String),
    #[error("envelope carries no user id")]
    MissingUserId,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("envelope codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Actor(#[from] ActorError),
    #[error("envelope for `{0}` carries no model id")]
    MissingModelId(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
