use thiserror::Error;

#[derive(Debug, Error)]
pub enum PulpitError {
    #[error("Plugin load error: {0}")]
    PluginLoadError(String),

    #[error("Dependency resolution error: {0}")]
    DependencyError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Generation API error {status}: {body}")]
    GenerationStatus { status: u16, body: String },

    #[error("Generation transport error: {message}")]
    GenerationTransport { message: String, connect: bool },

    #[error("Generation decode error: {0}")]
    GenerationDecode(String),

    #[error("No generation strategy configured")]
    NoStrategy,

    #[error("Send error: {0}")]
    SendError(String),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Coarse bucket used to pick the wording of a user-visible apology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    Unauthorized,
    Network,
    Other,
}

impl PulpitError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::GenerationStatus { status: 429, .. } => FailureClass::RateLimited,
            Self::GenerationStatus { status: 401, .. } => FailureClass::Unauthorized,
            Self::GenerationTransport { connect: true, .. } => FailureClass::Network,
            _ => FailureClass::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PulpitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_classes() {
        let limited = PulpitError::GenerationStatus { status: 429, body: "slow down".into() };
        assert_eq!(limited.failure_class(), FailureClass::RateLimited);

        let auth = PulpitError::GenerationStatus { status: 401, body: String::new() };
        assert_eq!(auth.failure_class(), FailureClass::Unauthorized);

        let server = PulpitError::GenerationStatus { status: 500, body: String::new() };
        assert_eq!(server.failure_class(), FailureClass::Other);
    }

    #[test]
    fn only_connect_failures_count_as_network() {
        let dns = PulpitError::GenerationTransport { message: "dns".into(), connect: true };
        assert_eq!(dns.failure_class(), FailureClass::Network);

        let reset = PulpitError::GenerationTransport { message: "reset".into(), connect: false };
        assert_eq!(reset.failure_class(), FailureClass::Other);
        assert_eq!(PulpitError::NoStrategy.failure_class(), FailureClass::Other);
    }
}
