mod config;

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    courier_bindings::{BindingStore, SqliteStore},
    courier_common::Identity,
    courier_forward::{ForwardClient, Forwarder, IdentityPool, RuntimeSettings},
    courier_telegram::{
        BotForwarder,
        admin::AdminContext,
        client::build_bot,
        listener,
    },
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier — Telegram channel reposter")]
struct Cli {
    /// Path to courier.toml (overrides discovery).
    #[arg(long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Database path (overrides config value).
    #[arg(long, env = "COURIER_DB")]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = config::load(cli.config.as_deref())?;
    config.telegram.validate()?;

    let db_path = cli.db.unwrap_or(config.storage.path);
    let store: Arc<dyn BindingStore> = Arc::new(
        SqliteStore::new(&format!("sqlite://{}?mode=rwc", db_path.display())).await?,
    );

    // The persisted step wins over the config default.
    let step = store
        .repost_step()
        .await?
        .unwrap_or(config.forward.repost_step);
    let settings = Arc::new(RuntimeSettings::new(
        step,
        Duration::from_secs_f64(config.forward.album_idle_secs),
    ));
    info!(
        db = %db_path.display(),
        repost_step = settings.repost_step(),
        album_idle_ms = settings.album_idle().as_millis() as u64,
        "courier starting"
    );

    let primary_bot = build_bot(&config.telegram.token)?;
    let mut pool =
        IdentityPool::new(Arc::new(BotForwarder::new(primary_bot.clone())) as Arc<dyn ForwardClient>);

    let fallback_bot = match &config.telegram.fallback_token {
        Some(token) => {
            let bot = build_bot(token)?;
            pool = pool.with_fallback(Arc::new(BotForwarder::new(bot.clone())) as Arc<dyn ForwardClient>);
            Some(bot)
        },
        None => None,
    };

    let forwarder = Forwarder::new(Arc::clone(&store), pool, Arc::clone(&settings));

    let admin = Arc::new(AdminContext {
        bot: primary_bot.clone(),
        store: Arc::clone(&store),
        settings: Arc::clone(&settings),
        owners: config.telegram.owner_ids.iter().copied().collect(),
    });

    let mut cancels = vec![
        listener::start_polling(
            Identity::Primary,
            primary_bot,
            Arc::clone(&forwarder),
            Some(admin),
        )
        .await?,
    ];
    if let Some(bot) = fallback_bot {
        cancels.push(
            listener::start_polling(Identity::Fallback, bot, Arc::clone(&forwarder), None).await?,
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    for cancel in cancels {
        cancel.cancel();
    }

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
