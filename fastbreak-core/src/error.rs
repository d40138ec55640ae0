use thiserror::Error;

pub type Result<T> = std::result::Result<T, FastbreakError>;

#[derive(Error, Debug)]
pub enum FastbreakError {
    #[error("Wallet not connected")]
    NotAuthenticated,

    #[error("Authorization rejected: {0}")]
    Authorization(String),

    #[error("Transaction submission failed: {0}")]
    Submission(String),

    #[error("Transaction {transaction_id} failed during execution: {message}")]
    Execution {
        transaction_id: String,
        message: String,
    },

    #[error("Transaction expired before sealing: {0}")]
    Expired(String),

    #[error("Round stalled: {0}")]
    Stalled(String),

    #[error("Network connection error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Access node returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid transaction id: {0}")]
    InvalidTransactionId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FastbreakError {
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    pub fn stalled(msg: impl Into<String>) -> Self {
        Self::Stalled(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Errors the operator caused by refusing or not connecting the wallet.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::Authorization(_))
    }
}
