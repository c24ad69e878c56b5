//! Telegram adapter for courier.
//!
//! Connects one or two bot identities over long polling, feeds channel
//! posts into the forwarding pipeline, implements the outbound forward
//! operations, and serves the owner-only admin command surface.

pub mod admin;
pub mod client;
pub mod config;
pub mod error;
pub mod listener;

pub use {client::BotForwarder, config::TelegramConfig, error::ConfigError};
