//! Owner-only admin command surface.
//!
//! Runs on the primary identity. Private messages from configured owners
//! manage the binding graph and the decimation step; everything else is
//! ignored. The inline-keyboard flows of classic reposter bots are
//! deliberately flattened to plain text commands.

use std::{collections::HashSet, sync::Arc};

use {
    anyhow::Result,
    teloxide::{
        Bot,
        payloads::SendMessageSetters,
        prelude::Requester,
        types::{ChatId, Message, ParseMode, Recipient},
        utils::html,
    },
    tracing::{debug, info, warn},
};

use {
    courier_bindings::BindingStore,
    courier_common::{ChannelId, ChannelRecord},
    courier_forward::RuntimeSettings,
};

/// Everything the admin surface needs to act.
pub struct AdminContext {
    pub bot: Bot,
    pub store: Arc<dyn BindingStore>,
    pub settings: Arc<RuntimeSettings>,
    pub owners: HashSet<u64>,
}

/// A channel referenced in a command, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    Id(i64),
    Username(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Start,
    Help,
    AddSource { chat: ChatRef, name: Option<String> },
    AddTarget { chat: ChatRef, name: Option<String> },
    RemoveSource(i64),
    RemoveTarget(i64),
    Bind { source: i64, targets: Vec<i64> },
    Unbind { source: i64, target: i64 },
    Sources,
    Targets,
    List,
    Step(Option<u32>),
}

const USAGE: &str = "<b>courier commands</b>\n\
    /add_source &lt;id|@username&gt; [name] — register a source channel\n\
    /add_target &lt;id|@username&gt; [name] — register a target channel\n\
    /remove_source &lt;id&gt; — unregister a source (drops its bindings)\n\
    /remove_target &lt;id&gt; — unregister a target (drops its bindings)\n\
    /bind &lt;source&gt; &lt;target...&gt; — forward source posts to targets\n\
    /unbind &lt;source&gt; &lt;target&gt; — remove one binding\n\
    /sources — list registered sources\n\
    /targets — list registered targets\n\
    /list — list bindings\n\
    /step [n] — show or set \"forward every nth post\" (1-10)";

/// Parse one message text into a command.
///
/// `None` when the text is not a command at all; `Err` carries the reply for
/// a malformed one. A `@botname` suffix on the command word is accepted.
pub fn parse_command(text: &str) -> Option<std::result::Result<AdminCommand, String>> {
    let mut words = text.split_whitespace();
    let head = words.next()?;
    if !head.starts_with('/') {
        return None;
    }
    let command = head[1..].split('@').next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let parsed = match command {
        "start" => Ok(AdminCommand::Start),
        "help" => Ok(AdminCommand::Help),
        "add_source" => parse_add(&args).map(|(chat, name)| AdminCommand::AddSource { chat, name }),
        "add_target" => parse_add(&args).map(|(chat, name)| AdminCommand::AddTarget { chat, name }),
        "remove_source" => parse_id(&args).map(AdminCommand::RemoveSource),
        "remove_target" => parse_id(&args).map(AdminCommand::RemoveTarget),
        "bind" => parse_bind(&args),
        "unbind" => parse_unbind(&args),
        "sources" => Ok(AdminCommand::Sources),
        "targets" => Ok(AdminCommand::Targets),
        "list" => Ok(AdminCommand::List),
        "step" => parse_step(&args),
        _ => return None,
    };
    Some(parsed)
}

fn parse_chat_ref(word: &str) -> std::result::Result<ChatRef, String> {
    if let Some(username) = word.strip_prefix('@') {
        if username.is_empty() {
            return Err("Usage: send a @username or a numeric id.".into());
        }
        return Ok(ChatRef::Username(username.to_string()));
    }
    word.parse::<i64>()
        .map(ChatRef::Id)
        .map_err(|_| "Usage: send a @username or a numeric id.".into())
}

fn parse_add(args: &[&str]) -> std::result::Result<(ChatRef, Option<String>), String> {
    let Some((first, rest)) = args.split_first() else {
        return Err("Usage: /add_source <id|@username> [name]".into());
    };
    let chat = parse_chat_ref(first)?;
    let name = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };
    Ok((chat, name))
}

fn parse_id(args: &[&str]) -> std::result::Result<i64, String> {
    match args {
        [word] => word
            .parse()
            .map_err(|_| "Usage: pass one numeric channel id.".into()),
        _ => Err("Usage: pass one numeric channel id.".into()),
    }
}

fn parse_bind(args: &[&str]) -> std::result::Result<AdminCommand, String> {
    if args.len() < 2 {
        return Err("Usage: /bind <source> <target...>".into());
    }
    let mut ids = args.iter().map(|w| w.parse::<i64>());
    let source = ids
        .next()
        .and_then(std::result::Result::ok)
        .ok_or("Usage: /bind <source> <target...>")?;
    let targets: std::result::Result<Vec<i64>, _> = ids.collect();
    match targets {
        Ok(targets) => Ok(AdminCommand::Bind { source, targets }),
        Err(_) => Err("Usage: /bind <source> <target...>".into()),
    }
}

fn parse_unbind(args: &[&str]) -> std::result::Result<AdminCommand, String> {
    match args {
        [source, target] => match (source.parse(), target.parse()) {
            (Ok(source), Ok(target)) => Ok(AdminCommand::Unbind { source, target }),
            _ => Err("Usage: /unbind <source> <target>".into()),
        },
        _ => Err("Usage: /unbind <source> <target>".into()),
    }
}

fn parse_step(args: &[&str]) -> std::result::Result<AdminCommand, String> {
    match args {
        [] => Ok(AdminCommand::Step(None)),
        [word] => match word.parse::<u32>() {
            Ok(step) if (1..=10).contains(&step) => Ok(AdminCommand::Step(Some(step))),
            _ => Err("Step must be a number between 1 and 10.".into()),
        },
        _ => Err("Usage: /step [n]".into()),
    }
}

/// Handle one private message on the primary identity.
pub async fn handle_admin_message(ctx: &AdminContext, msg: &Message) -> Result<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if !ctx.owners.contains(&user.id.0) {
        debug!(user_id = user.id.0, "ignoring message from non-owner");
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(parsed) = parse_command(text) else {
        return Ok(());
    };

    let reply = match parsed {
        Err(usage) => usage,
        Ok(command) => {
            info!(user_id = user.id.0, ?command, "admin command");
            match execute(ctx, command).await {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(error = %error, "admin command failed");
                    format!("Error: {}", html::escape(&error.to_string()))
                },
            }
        },
    };

    ctx.bot
        .send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn execute(ctx: &AdminContext, command: AdminCommand) -> Result<String> {
    match command {
        AdminCommand::Start | AdminCommand::Help => Ok(USAGE.to_string()),

        AdminCommand::AddSource { chat, name } => {
            let record = resolve_chat(ctx, chat, name).await?;
            let line = channel_anchor(&record);
            ctx.store.upsert_source(&record).await?;
            Ok(format!("Source added: {line} (<code>{}</code>)", record.id))
        },

        AdminCommand::AddTarget { chat, name } => {
            let record = resolve_chat(ctx, chat, name).await?;
            let line = channel_anchor(&record);
            ctx.store.upsert_target(&record).await?;
            Ok(format!("Target added: {line} (<code>{}</code>)", record.id))
        },

        AdminCommand::RemoveSource(raw) => {
            let outcome = ctx.store.remove_source(ChannelId::canonical(raw)).await?;
            Ok(if outcome.removed {
                format!(
                    "Source \u{201c}{}\u{201d} removed. Bindings dropped: {}.",
                    html::escape(&outcome.name),
                    outcome.bindings_removed
                )
            } else {
                "No such source.".to_string()
            })
        },

        AdminCommand::RemoveTarget(raw) => {
            let outcome = ctx.store.remove_target(ChannelId::canonical(raw)).await?;
            Ok(if outcome.removed {
                format!(
                    "Target \u{201c}{}\u{201d} removed. Bindings dropped: {}.",
                    html::escape(&outcome.name),
                    outcome.bindings_removed
                )
            } else {
                "No such target.".to_string()
            })
        },

        AdminCommand::Bind { source, targets } => {
            let targets: Vec<ChannelId> =
                targets.into_iter().map(ChannelId::canonical).collect();
            let outcome = ctx
                .store
                .bind(ChannelId::canonical(source), &targets)
                .await?;
            let mut parts = Vec::new();
            if outcome.added > 0 {
                parts.push(format!("Bindings added: {}", outcome.added));
            }
            if outcome.existing > 0 {
                parts.push(format!("Already existed: {}", outcome.existing));
            }
            Ok(if parts.is_empty() {
                "No bindings added.".to_string()
            } else {
                parts.join("\n")
            })
        },

        AdminCommand::Unbind { source, target } => {
            let removed = ctx
                .store
                .unbind(ChannelId::canonical(source), ChannelId::canonical(target))
                .await?;
            Ok(if removed {
                "Binding removed.".to_string()
            } else {
                "No such binding.".to_string()
            })
        },

        AdminCommand::Sources => {
            let records = ctx.store.list_sources().await?;
            Ok(format_channel_list("Sources", &records))
        },

        AdminCommand::Targets => {
            let records = ctx.store.list_targets().await?;
            Ok(format_channel_list("Targets", &records))
        },

        AdminCommand::List => {
            let bindings = ctx.store.bindings().await?;
            let sources = ctx.store.list_sources().await?;
            let targets = ctx.store.list_targets().await?;
            Ok(format_bindings(&bindings, &sources, &targets))
        },

        AdminCommand::Step(None) => {
            let step = ctx.settings.repost_step();
            Ok(if step <= 1 {
                "Forwarding every post.".to_string()
            } else {
                format!("Forwarding every {step}th post.")
            })
        },

        AdminCommand::Step(Some(step)) => {
            ctx.store.set_repost_step(step).await?;
            ctx.settings.set_repost_step(step);
            Ok(if step <= 1 {
                "Done. Forwarding every post.".to_string()
            } else {
                format!("Done. Forwarding every {step}th post.")
            })
        },
    }
}

/// Turn a command argument into a channel record with a canonical id.
///
/// `@username` refs are resolved through `getChat`. Numeric refs try the
/// same lookup for a display name but tolerate failure — the bot may simply
/// not have seen the chat yet.
async fn resolve_chat(
    ctx: &AdminContext,
    chat: ChatRef,
    name_override: Option<String>,
) -> Result<ChannelRecord> {
    match chat {
        ChatRef::Username(username) => {
            let chat = ctx
                .bot
                .get_chat(Recipient::ChannelUsername(format!("@{username}")))
                .await?;
            let id = ChannelId::canonical(chat.id.0);
            let name = name_override
                .or_else(|| chat.title().map(ToOwned::to_owned))
                .unwrap_or_else(|| format!("@{username}"));
            Ok(ChannelRecord {
                id,
                name,
                username: Some(username),
            })
        },
        ChatRef::Id(raw) => {
            let id = ChannelId::canonical(raw);
            let looked_up = ctx.bot.get_chat(Recipient::Id(ChatId(id.0))).await.ok();
            let username = looked_up
                .as_ref()
                .and_then(|chat| chat.username().map(ToOwned::to_owned));
            let name = name_override
                .or_else(|| {
                    looked_up
                        .as_ref()
                        .and_then(|chat| chat.title().map(ToOwned::to_owned))
                })
                .unwrap_or_else(|| id.to_string());
            Ok(ChannelRecord { id, name, username })
        },
    }
}

/// HTML anchor for a channel: a t.me link when the username is known.
fn channel_anchor(record: &ChannelRecord) -> String {
    let name = html::escape(&record.name);
    match &record.username {
        Some(username) => format!("<a href=\"https://t.me/{username}\">{name}</a>"),
        None => name,
    }
}

fn format_channel_list(title: &str, records: &[ChannelRecord]) -> String {
    if records.is_empty() {
        return format!("No {} registered.", title.to_lowercase());
    }
    let mut lines = vec![format!("<b>{title}:</b>")];
    for record in records {
        lines.push(format!(
            "• {} (<code>{}</code>)",
            channel_anchor(record),
            record.id
        ));
    }
    lines.join("\n")
}

fn format_bindings(
    bindings: &[(ChannelId, ChannelId)],
    sources: &[ChannelRecord],
    targets: &[ChannelRecord],
) -> String {
    if bindings.is_empty() {
        return "No bindings.".to_string();
    }

    let source_anchor = |id: ChannelId| {
        sources
            .iter()
            .find(|r| r.id == id)
            .map(channel_anchor)
            .unwrap_or_else(|| id.to_string())
    };
    let target_anchor = |id: ChannelId| {
        targets
            .iter()
            .find(|r| r.id == id)
            .map(channel_anchor)
            .unwrap_or_else(|| id.to_string())
    };

    let mut grouped: Vec<(ChannelId, Vec<ChannelId>)> = Vec::new();
    for (source, target) in bindings {
        match grouped.iter_mut().find(|(s, _)| s == source) {
            Some((_, list)) => list.push(*target),
            None => grouped.push((*source, vec![*target])),
        }
    }

    grouped
        .into_iter()
        .map(|(source, list)| {
            let targets: Vec<String> = list.into_iter().map(target_anchor).collect();
            format!("{} → {}", source_anchor(source), targets.join(" + "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
