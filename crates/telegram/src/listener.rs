//! Long-polling update loops.
//!
//! One loop per identity. Both loops feed channel posts into the same
//! forwarding pipeline — the dedup ledger absorbs the duplicate deliveries —
//! while admin messages are handled on the primary identity only.

use std::sync::Arc;

use {
    teloxide::{
        ApiError, Bot, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    courier_common::{ChannelId, Identity, InboundPost, MessageId},
    courier_forward::Forwarder,
};

use crate::admin::{self, AdminContext};

/// Start polling for one identity.
///
/// Verifies credentials, clears any webhook, then spawns a background task
/// that processes updates until the returned token is cancelled. Pass the
/// admin context on the primary identity only.
pub async fn start_polling(
    identity: Identity,
    bot: Bot,
    forwarder: Arc<Forwarder>,
    admin: Option<Arc<AdminContext>>,
) -> anyhow::Result<CancellationToken> {
    let me = bot.get_me().await?;
    let username = me.username.clone();

    // Long polling requires no webhook to be registered.
    bot.delete_webhook().send().await?;

    if admin.is_some() {
        // Slash-command autocomplete in Telegram clients.
        let commands = vec![
            BotCommand::new("add_source", "Register a source channel"),
            BotCommand::new("add_target", "Register a target channel"),
            BotCommand::new("bind", "Forward a source to targets"),
            BotCommand::new("unbind", "Remove one binding"),
            BotCommand::new("sources", "List sources"),
            BotCommand::new("targets", "List targets"),
            BotCommand::new("list", "List bindings"),
            BotCommand::new("step", "Show or set the repost step"),
            BotCommand::new("help", "Show available commands"),
        ];
        if let Err(e) = bot.set_my_commands(commands).await {
            warn!(%identity, "failed to register bot commands: {e}");
        }
    }

    info!(%identity, username = ?username, "telegram identity connected (webhook cleared)");

    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();

    tokio::spawn(async move {
        info!(%identity, "starting polling loop");
        let mut offset: i32 = 0;

        loop {
            if loop_cancel.is_cancelled() {
                info!(%identity, "polling stopped");
                break;
            }

            let result = bot
                .get_updates()
                .offset(offset)
                .timeout(30)
                .allowed_updates(vec![AllowedUpdate::ChannelPost, AllowedUpdate::Message])
                .await;

            match result {
                Ok(updates) => {
                    debug!(%identity, count = updates.len(), "got updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::ChannelPost(msg) => {
                                let post = inbound_post(&msg, identity);
                                debug!(
                                    %identity,
                                    source = %post.source,
                                    message = %post.message,
                                    group = ?post.group,
                                    "received channel post"
                                );
                                forwarder.handle_post(post).await;
                            },
                            UpdateKind::Message(msg) => {
                                let Some(admin) = admin.as_ref() else {
                                    continue;
                                };
                                if let Err(e) = admin::handle_admin_message(admin, &msg).await {
                                    error!(%identity, error = %e, "error handling admin message");
                                }
                            },
                            other => {
                                debug!(%identity, "ignoring update: {other:?}");
                            },
                        }
                    }
                },
                Err(e) => {
                    // Another process is polling with the same token; this
                    // loop can never win, so stop it.
                    if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                        error!(
                            %identity,
                            "polling disabled: another instance is already running with this token"
                        );
                        loop_cancel.cancel();
                        break;
                    }

                    warn!(%identity, error = %e, "getUpdates failed");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                },
            }
        }
    });

    Ok(cancel)
}

fn inbound_post(msg: &Message, identity: Identity) -> InboundPost {
    InboundPost {
        source: ChannelId::canonical(msg.chat.id.0),
        message: MessageId(msg.id.0),
        group: msg.media_group_id().map(ToOwned::to_owned),
        via: identity,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_post_carries_group_and_identity() {
        let json = serde_json::json!({
            "message_id": 77,
            "date": 1_700_000_000,
            "chat": {"id": -1_001_234_567_890_i64, "type": "channel", "title": "news"},
            "media_group_id": "g42",
            "photo": [],
        });
        let msg: Message = serde_json::from_value(json).unwrap();

        let post = inbound_post(&msg, Identity::Fallback);
        assert_eq!(post.source, ChannelId(-1_001_234_567_890));
        assert_eq!(post.message, MessageId(77));
        assert_eq!(post.group.as_deref(), Some("g42"));
        assert_eq!(post.via, Identity::Fallback);
    }

    #[test]
    fn inbound_post_without_group() {
        let json = serde_json::json!({
            "message_id": 5,
            "date": 1_700_000_000,
            "chat": {"id": -1_001_234_567_890_i64, "type": "channel", "title": "news"},
            "text": "hello",
        });
        let msg: Message = serde_json::from_value(json).unwrap();

        let post = inbound_post(&msg, Identity::Primary);
        assert!(post.group.is_none());
    }
}
