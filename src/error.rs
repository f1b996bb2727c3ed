use thiserror::Error;

/// Failure to turn one input line (or one of its sub-fields) into typed values.
///
/// Always non-fatal: the offending record or sub-field is dropped and
/// ingestion carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Record is not an object")]
    NotAnObject,

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Field '{field}' has {found} elements, expected {expected}")]
    Length {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Connector error types
#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Endpoint enumeration failed: {0}")]
    Enumeration(String),

    #[error("Transport error on {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Log I/O error: {0}")]
    LogIo(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    pub fn transport(endpoint: &str, reason: impl ToString) -> Self {
        ConnectorError::Transport {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the connection that produced this error is gone for good.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            ConnectorError::Transport { .. } | ConnectorError::Enumeration(_)
        )
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        ConnectorError::LogIo(err.to_string())
    }
}

impl From<csv::Error> for ConnectorError {
    fn from(err: csv::Error) -> Self {
        ConnectorError::LogIo(err.to_string())
    }
}

/// Result type for connector operations
pub type CResult<T> = Result<T, ConnectorError>;
