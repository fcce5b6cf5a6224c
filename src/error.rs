use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Admission cancelled while waiting for a permit")]
    AdmissionCancelled,

    #[error("Rate limiter has been shut down")]
    LimiterShutdown,

    #[error("Replenishment error: {0}")]
    Replenish(String),

    #[error("Request construction error: {0}")]
    Construction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registration service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Initialization error: {0}")]
    Init(String),
}

impl AppError {
    /// The request never reached the network.
    pub fn is_construction(&self) -> bool {
        matches!(self, AppError::Construction(_) | AppError::Serialization(_))
    }

    /// The request was admitted and sent, but the call failed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Transport(_) | AppError::Http(_) | AppError::Status { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
