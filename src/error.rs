//! Error types for vdp-recon-rs.
//!
//! Tool failures are not errors: they are captured in [`crate::types::ToolResult`].
//! These variants cover the conditions that abort a single scan or the startup.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid scope: {0}")]
    Scope(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
