//! Outbound forwarding seam.

use std::sync::Arc;

use {anyhow::Result, async_trait::async_trait};

use courier_common::{ChannelId, Identity, MessageId};

/// One credentialed connection capable of issuing forward operations.
///
/// Errors are opaque; their rendered text is fed to the permission-failure
/// classifier and nothing else.
#[async_trait]
pub trait ForwardClient: Send + Sync {
    /// Forward a single message by id.
    async fn forward_one(
        &self,
        target: ChannelId,
        source: ChannelId,
        message: MessageId,
    ) -> Result<()>;

    /// Forward a set of messages (an album) as one operation.
    /// `messages` is sorted ascending and non-empty.
    async fn forward_album(
        &self,
        target: ChannelId,
        source: ChannelId,
        messages: &[MessageId],
    ) -> Result<()>;
}

/// What to forward: a single message or a coalesced album.
#[derive(Debug, Clone)]
pub enum ForwardRequest {
    Single(MessageId),
    Album(Vec<MessageId>),
}

/// The primary identity plus an optional fallback.
pub struct IdentityPool {
    primary: Arc<dyn ForwardClient>,
    fallback: Option<Arc<dyn ForwardClient>>,
}

impl IdentityPool {
    #[must_use]
    pub fn new(primary: Arc<dyn ForwardClient>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn ForwardClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Issue `request` to `target` through the given identity.
    pub async fn forward(
        &self,
        identity: Identity,
        target: ChannelId,
        source: ChannelId,
        request: &ForwardRequest,
    ) -> Result<()> {
        let client = match identity {
            Identity::Primary => &self.primary,
            Identity::Fallback => self
                .fallback
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no fallback identity configured"))?,
        };
        match request {
            ForwardRequest::Single(message) => client.forward_one(target, source, *message).await,
            ForwardRequest::Album(messages) => {
                client.forward_album(target, source, messages).await
            },
        }
    }
}
