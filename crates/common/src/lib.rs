//! Shared types for courier.
//!
//! Canonical channel identifiers, the inbound post model, and the identity
//! enum used across the forwarding pipeline and the Telegram adapter.

pub mod channel_id;
pub mod types;

pub use types::{ChannelId, ChannelRecord, DedupKey, GroupId, Identity, InboundPost, MessageId};
