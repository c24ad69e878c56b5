use serde::{Deserialize, Serialize};

use crate::channel_id::canonicalize;

/// Canonical chat identifier (source or target channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl ChannelId {
    /// Build a canonical id from a raw platform id.
    #[must_use]
    pub fn canonical(raw: i64) -> Self {
        Self(canonicalize(raw))
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Message sequence number within a chat (i32 on the Telegram wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Album (media group) identifier. Non-empty only for album fragments.
pub type GroupId = String;

/// Which credentialed connection served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Primary,
    Fallback,
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// One inbound post observed in a source channel.
#[derive(Debug, Clone)]
pub struct InboundPost {
    /// Canonical id of the channel the post originated in.
    pub source: ChannelId,
    pub message: MessageId,
    /// Set when the post is one fragment of a multi-item album.
    pub group: Option<GroupId>,
    /// Which listening identity delivered this event.
    pub via: Identity,
}

/// A registered source or target channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub name: String,
    /// Public @username, when the channel has one (renders t.me anchors).
    pub username: Option<String>,
}

/// Key under which a forwarded (or decimation-skipped) post is remembered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Message(ChannelId, MessageId),
    Album(ChannelId, GroupId),
}

impl DedupKey {
    /// The dedup key for a post: album key when grouped, message key otherwise.
    #[must_use]
    pub fn for_post(post: &InboundPost) -> Self {
        match &post.group {
            Some(group) => Self::Album(post.source, group.clone()),
            None => Self::Message(post.source, post.message),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_canonical_normalizes() {
        assert_eq!(ChannelId::canonical(1_234_567_890).0, -1_001_234_567_890);
        assert_eq!(ChannelId::canonical(-5), ChannelId(-5));
    }

    #[test]
    fn dedup_key_prefers_album() {
        let post = InboundPost {
            source: ChannelId(-100),
            message: MessageId(7),
            group: Some("g1".into()),
            via: Identity::Primary,
        };
        assert_eq!(
            DedupKey::for_post(&post),
            DedupKey::Album(ChannelId(-100), "g1".into())
        );
    }

    #[test]
    fn dedup_key_single_message() {
        let post = InboundPost {
            source: ChannelId(-100),
            message: MessageId(7),
            group: None,
            via: Identity::Fallback,
        };
        assert_eq!(
            DedupKey::for_post(&post),
            DedupKey::Message(ChannelId(-100), MessageId(7))
        );
    }

    #[test]
    fn channel_id_serde_is_transparent() {
        let id: ChannelId = serde_json::from_str("-1001234567890").unwrap();
        assert_eq!(id, ChannelId(-1_001_234_567_890));
        assert_eq!(serde_json::to_string(&id).unwrap(), "-1001234567890");
    }
}
