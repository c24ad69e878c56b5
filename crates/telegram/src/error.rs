use thiserror::Error;

/// Configuration problems caught before any network call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("telegram bot token is required")]
    MissingToken,

    #[error("at least one owner id is required")]
    NoOwners,
}
