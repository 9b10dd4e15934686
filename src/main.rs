//! shop-bot: Telegram storefront bot with catalog, cart, checkout and order notifications.

mod bot;
mod cart;
mod checkout;
mod config;
mod db;
mod notify;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use teloxide::dispatching::Dispatcher;
use teloxide::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/shop-bot.toml"));
    tracing::info!("Starting shop-bot with config {}", config_path.display());

    let config = Arc::new(config::Config::load(&config_path)?);
    let token = config.bot_token()?;
    tracing::info!(
        admin_count = config.admin_ids.len(),
        db_path = %config.db_path.display(),
        admin_chat_id = ?config.admin_chat_id,
        admin_group_id = ?config.admin_group_id,
        webapp = config.webapp_link().is_some(),
        idle_ttl_secs = config.session.idle_ttl_secs,
        "Configuration loaded"
    );

    let db = Arc::new(db::Db::open(&config.db_path).await?);
    let sessions = Arc::new(session::SessionManager::new(config.session.idle_ttl()));
    let reaper = Arc::clone(&sessions).spawn_reaper(config.session.sweep_interval());

    let bot = Bot::new(token);
    let bot_username = match bot.get_me().await {
        Ok(me) => me.user.username.clone(),
        Err(error) => {
            tracing::warn!(error = %error, "Failed to fetch bot username via getMe");
            None
        }
    };

    let state = bot::handlers::BotState {
        config,
        db,
        sessions,
        bot_username,
    };
    tracing::info!("Dispatcher initialized, bot is ready");

    Dispatcher::builder(bot, bot::handlers::schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    reaper.abort();
    tracing::info!("Shutting down");
    Ok(())
}
