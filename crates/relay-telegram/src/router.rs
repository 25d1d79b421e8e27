use std::sync::Arc;

use teloxide::{
    dispatching::{Dispatcher, UpdateHandler},
    dptree,
    prelude::*,
    types::BotCommand,
};

use tokio::sync::Mutex;

use relay_core::{
    broadcast::Broadcaster,
    config::Config,
    domain::UserId,
    messaging::port::MessagingPort,
    registry::ChannelRegistry,
    transport::Transport,
    utils::AuditLogger,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub broadcaster: Broadcaster,
    pub messenger: Arc<dyn MessagingPort>,
    pub audit: Arc<AuditLogger>,
    /// Held for the duration of a broadcast so two payloads never interleave sends.
    pub broadcast_lock: Arc<Mutex<()>>,
    pub bot_username: String,
}

/// Commands advertised in the Telegram command menu.
pub fn command_menu() -> Vec<BotCommand> {
    [
        ("start", "Show help"),
        ("add", "Add a channel: /add @channel or /add -100..."),
        ("remove", "Remove a channel"),
        ("list", "List all channels"),
        ("clear", "Remove ALL channels"),
        ("test", "Send a test message to all channels"),
        ("stats", "Show statistics"),
        ("myid", "Show your Telegram user id"),
    ]
    .into_iter()
    .map(|(cmd, desc)| BotCommand::new(cmd, desc))
    .collect()
}

fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message))
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // The bot's own id is needed for every admin-membership check.
    let me = bot.get_me().await?;
    let bot_username = me.username().to_string();
    tracing::info!(bot = %bot_username, owner = cfg.owner_id.0, "relay bot started");

    let messenger = Arc::new(TelegramMessenger::new(
        bot.clone(),
        UserId(me.id.0 as i64),
    ));
    let transport: Arc<dyn Transport> = messenger.clone();
    let broadcaster = Broadcaster::new(transport, Arc::new(ChannelRegistry::new()));

    if let Err(e) = bot.set_my_commands(command_menu()).await {
        tracing::warn!(error = %e, "failed to set bot command menu");
    }

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        broadcaster,
        messenger,
        audit: Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
        broadcast_lock: Arc::new(Mutex::new(())),
        bot_username,
    });

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped");
    Ok(())
}
