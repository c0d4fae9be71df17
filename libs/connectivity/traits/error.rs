use thiserror::Error;

/// Main error type for the connectivity core
#[derive(Error, Debug)]
pub enum ConnectivityError {
    /// Transport could not be opened or closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single send operation failed, the client stays usable
    #[error("Send failed: {0}")]
    Send(String),

    /// Wire text could not be turned into a message
    #[error("Decode error: {0}")]
    Decode(String),

    /// Message could not be turned into wire text
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid connection or listener settings
    #[error("Settings error: {0}")]
    Settings(String),

    /// Dictionary file is malformed or violates layout rules
    #[error("Dictionary load error: {0}")]
    DictionaryLoad(String),

    /// A listener failed to process a message
    #[error("Listener '{name}' failed: {reason}")]
    Listener { name: String, reason: String },

    /// Message record could not be (de)serialized
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operation is not allowed in the current client state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectivityError {
    /// Whether this error means the transport itself is gone
    ///
    /// The receiver worker stops on fatal errors and keeps polling on
    /// everything else (up to its error budget).
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectivityError::Connection(_))
    }
}

impl From<serde_json::Error> for ConnectivityError {
    fn from(e: serde_json::Error) -> Self {
        ConnectivityError::Persistence(e.to_string())
    }
}

/// Result type for connectivity operations
pub type Result<T> = std::result::Result<T, ConnectivityError>;
