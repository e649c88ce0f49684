use thiserror::Error;

/// Classifies fatal configuration errors for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A CIDR block in a fetched rule, route or subnet could not be parsed
    InvalidCidr,
    /// A rule record is structurally invalid (bad action, reserved rule number, ...)
    InvalidRule,
    /// More than one route table claims to be the main table of a network
    MultipleMainRouteTables,
    /// A subnet has neither an explicit nor a main route table
    MissingRouteTable,
    /// A field the evaluation depends on is absent from the snapshot
    MissingField,
    /// The snapshot document itself could not be decoded
    InvalidSnapshot,
}

/// Reachability engine error types
#[derive(Error, Debug)]
pub enum ReachError {
    #[error("Configuration error: {message}")]
    Configuration {
        kind: ConfigErrorKind,
        message: String,
    },

    #[error("Ambiguous input: {0}")]
    AmbiguousInput(String),

    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("Invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReachError {
    pub(crate) fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        ReachError::Configuration {
            kind,
            message: message.into(),
        }
    }

    /// The snapshot is malformed; the evaluation cannot produce a verdict.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, ReachError::Configuration { .. })
    }

    /// The caller supplied a flow that can be fixed by changing the request.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            ReachError::AmbiguousInput(_)
                | ReachError::InvalidProtocol(_)
                | ReachError::InvalidPortRange(_)
        )
    }

    /// Configuration sub-kind, if this is a configuration error.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            ReachError::Configuration { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReachError>;
