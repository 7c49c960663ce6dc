use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Pointer store error: {0}")]
    Pointer(#[from] PointerError),

    #[error("Server error: {message}")]
    Server { message: String },
}

/// Key-value backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Backend command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Errors raised while relaying a read to the upstream authority
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream rejected the credential")]
    AuthFailed,

    #[error("Upstream refused access")]
    Forbidden,

    #[error("Cell not found upstream")]
    CellNotFound,

    #[error("Upstream endpoint not found: {url}")]
    EndpointNotFound { url: String },

    #[error("Upstream requires configuration")]
    PreconditionRequired,

    #[error("Upstream returned status {status}")]
    Status { status: u16 },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection refused by {url}")]
    ConnectionRefused { url: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Invalid upstream address: {message}")]
    InvalidUrl { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Pointer configuration store errors
#[derive(Debug, Error)]
pub enum PointerError {
    #[error("Pointer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pointer serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid upstream address: {reason}")]
    InvalidUrl { reason: String },
}

/// Caller-facing error taxonomy.
///
/// Every failure that can reach a client is expressed as one of these
/// variants. [`RelayError::status_code`] and [`RelayError::public_message`]
/// give the stable wire representation; the `Display` output may carry
/// internal detail and is meant for logs only.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Not configured: {message}")]
    NotConfigured { message: String },

    #[error("Backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("Pointer store failure: {message}")]
    ConfigStore { message: String },

    #[error("Upstream authentication failed")]
    UpstreamAuthFailed,

    #[error("Upstream forbidden")]
    UpstreamForbidden,

    #[error("Upstream endpoint not found")]
    UpstreamNotFound,

    #[error("Upstream precondition required")]
    UpstreamPreconditionRequired,

    #[error("Upstream protocol error: {message}")]
    UpstreamProtocolError { message: String },

    #[error("Upstream timeout after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("Upstream unreachable: {url}")]
    UpstreamUnreachable { url: String },

    #[error("Upstream network error: {message}")]
    UpstreamNetwork { message: String },

    #[error("Upstream returned HTTP {status}")]
    UpstreamGenericError { status: u16 },
}

impl RelayError {
    /// HTTP status code presented to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidRequest { .. } => 400,
            RelayError::NotFound { .. } => 404,
            RelayError::NotConfigured { .. } => 428,
            RelayError::BackendUnavailable { .. } => 500,
            RelayError::ConfigStore { .. } => 500,
            RelayError::UpstreamAuthFailed => 401,
            RelayError::UpstreamForbidden => 403,
            RelayError::UpstreamNotFound => 404,
            RelayError::UpstreamPreconditionRequired => 428,
            RelayError::UpstreamProtocolError { .. } => 502,
            RelayError::UpstreamTimeout { .. } => 504,
            RelayError::UpstreamUnreachable { .. } => 502,
            RelayError::UpstreamNetwork { .. } => 502,
            RelayError::UpstreamGenericError { .. } => 502,
        }
    }

    /// Message presented to the caller. Never contains backend or library text.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::InvalidRequest { message }
            | RelayError::NotFound { message }
            | RelayError::NotConfigured { message } => message.clone(),
            RelayError::BackendUnavailable { .. } => {
                "Cell storage is unavailable. Please try again later.".to_string()
            }
            RelayError::ConfigStore { .. } => {
                "Failed to access the upstream configuration.".to_string()
            }
            RelayError::UpstreamAuthFailed => {
                "Authentication failed with upstream server. Please check your token.".to_string()
            }
            RelayError::UpstreamForbidden => {
                "Access forbidden by upstream server. Please check your permissions.".to_string()
            }
            RelayError::UpstreamNotFound => {
                "Upstream server endpoint not found. Please verify the configuration.".to_string()
            }
            RelayError::UpstreamPreconditionRequired => {
                "Upstream server requires configuration. Please contact the session owner."
                    .to_string()
            }
            RelayError::UpstreamProtocolError { .. } => {
                "Invalid response from upstream server.".to_string()
            }
            RelayError::UpstreamTimeout { .. } => {
                "Connection to upstream server timed out. Please try again later.".to_string()
            }
            RelayError::UpstreamUnreachable { .. } => {
                "Cannot connect to upstream server. Please check if it is running.".to_string()
            }
            RelayError::UpstreamNetwork { .. } => {
                "Network error while contacting upstream server.".to_string()
            }
            RelayError::UpstreamGenericError { status } => {
                format!("Upstream server error (HTTP {})", status)
            }
        }
    }

    /// Shorthand for a validation failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        RelayError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Shorthand for a missing cell.
    pub fn not_found(message: impl Into<String>) -> Self {
        RelayError::NotFound {
            message: message.into(),
        }
    }
}

impl From<StorageError> for RelayError {
    fn from(err: StorageError) -> Self {
        RelayError::BackendUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::AuthFailed => RelayError::UpstreamAuthFailed,
            UpstreamError::Forbidden => RelayError::UpstreamForbidden,
            UpstreamError::CellNotFound => {
                RelayError::not_found("Cell not found on upstream server.")
            }
            UpstreamError::EndpointNotFound { .. } => RelayError::UpstreamNotFound,
            UpstreamError::PreconditionRequired => RelayError::UpstreamPreconditionRequired,
            UpstreamError::Status { status } => RelayError::UpstreamGenericError { status },
            UpstreamError::InvalidResponse { message } => {
                RelayError::UpstreamProtocolError { message }
            }
            UpstreamError::Timeout { timeout_ms } => RelayError::UpstreamTimeout { timeout_ms },
            UpstreamError::ConnectionRefused { url } => RelayError::UpstreamUnreachable { url },
            UpstreamError::Network { message } => RelayError::UpstreamNetwork { message },
            UpstreamError::InvalidUrl { message } => RelayError::NotConfigured {
                message: format!("Upstream address is invalid: {}", message),
            },
            UpstreamError::Http(e) => RelayError::UpstreamNetwork {
                message: e.to_string(),
            },
        }
    }
}

impl From<PointerError> for RelayError {
    fn from(err: PointerError) -> Self {
        match err {
            PointerError::InvalidUrl { reason } => RelayError::InvalidRequest { message: reason },
            other => RelayError::ConfigStore {
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for upstream operations
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Result type alias for pointer store operations
pub type PointerResult<T> = Result<T, PointerError>;

/// Result type alias for caller-facing operations
pub type RelayResult<T> = Result<T, RelayError>;
