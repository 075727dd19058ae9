use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PlanetaeError {
    /// The underlying connection could not be established or used.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The backend rejected a well-formed statement.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Capability gap of a backend variant, not a bug.
    #[error("{operation} is not implemented for {backend}")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid backup artifact: {0}")]
    InvalidArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl PlanetaeError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, PlanetaeError::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PlanetaeError::NotFound(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, PlanetaeError::Connection(_))
    }
}

impl From<figment::Error> for PlanetaeError {
    fn from(e: figment::Error) -> Self {
        PlanetaeError::Config(Box::new(e))
    }
}

impl From<ractor::RactorErr<crate::service::session_actor::SessionMessage>> for PlanetaeError {
    fn from(e: ractor::RactorErr<crate::service::session_actor::SessionMessage>) -> Self {
        PlanetaeError::Connection(format!("session unavailable: {e}"))
    }
}
