use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("check {check}: invalid scope: {reason}")]
    InvalidScope { check: String, reason: String },

    #[error("risk percentage must be within 0..=100, got {0}")]
    InvalidRiskPercentage(u8),

    #[error("check already registered: {0}")]
    DuplicateCheck(String),

    #[error("config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, CheckError>;
