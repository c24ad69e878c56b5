use {
    anyhow::Result,
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        Bot,
        prelude::Requester,
        types::{ChatId, MessageId as TgMessageId},
    },
    tracing::debug,
};

use {
    courier_common::{ChannelId, MessageId},
    courier_forward::ForwardClient,
};

/// Build a bot with a client timeout longer than the long-polling timeout
/// (30 s) so the HTTP client doesn't abort the request before Telegram
/// responds.
pub fn build_bot(token: &Secret<String>) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(std::time::Duration::from_secs(45))
        .build()?;
    Ok(Bot::with_client(token.expose_secret(), client))
}

/// One bot identity as a forward-operation client.
pub struct BotForwarder {
    bot: Bot,
}

impl BotForwarder {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ForwardClient for BotForwarder {
    async fn forward_one(
        &self,
        target: ChannelId,
        source: ChannelId,
        message: MessageId,
    ) -> Result<()> {
        debug!(%target, %source, %message, "forwarding message");
        self.bot
            .forward_message(ChatId(target.0), ChatId(source.0), TgMessageId(message.0))
            .await?;
        Ok(())
    }

    async fn forward_album(
        &self,
        target: ChannelId,
        source: ChannelId,
        messages: &[MessageId],
    ) -> Result<()> {
        debug!(%target, %source, count = messages.len(), "forwarding album");
        let ids: Vec<TgMessageId> = messages.iter().map(|m| TgMessageId(m.0)).collect();
        self.bot
            .forward_messages(ChatId(target.0), ChatId(source.0), ids)
            .await?;
        Ok(())
    }
}
