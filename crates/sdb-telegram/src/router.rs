use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use sdb_core::{
    app::BotService, config::Config, download::Downloader, messaging::port::MessagingPort,
};

use crate::handlers;
use crate::TelegramMessenger;

/// Long-poll Telegram until the process is stopped.
pub async fn run_polling(cfg: Arc<Config>, downloader: Arc<dyn Downloader>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed; continuing"),
    }
    info!(
        downloader = downloader.name(),
        download_dir = %cfg.download_dir.display(),
        allowed_users = cfg.telegram_allowed_users.len(),
        "configuration loaded"
    );
    if cfg.telegram_allowed_users.is_empty() {
        warn!("TELEGRAM_ALLOWED_USERS is empty; the bot answers everyone");
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let service = Arc::new(BotService::new(cfg, messenger, downloader));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![service])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("dispatcher stopped");
    Ok(())
}
