use shop_core::RemoteError;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl OrderError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::Unprocessable(msg.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
