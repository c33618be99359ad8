use std::sync::Arc;

use tally_chat::{bot_dispatcher, BotContext, ChatGateway, GatewayRunner};
use tally_core::config::{AppConfig, ConfigError, LoadOptions};
use tally_core::store::{DatabaseStore, JsonFileStore};
use tally_core::tracker::ActivityTracker;
use thiserror::Error;
use tracing::info;

/// Process-wide state handed to every task; nothing lives in globals.
pub struct Application {
    pub config: AppConfig,
    pub tracker: Arc<ActivityTracker>,
    pub bot: Arc<BotContext>,
    pub gateway: Arc<dyn ChatGateway>,
    pub runner: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub fn load_config(options: LoadOptions) -> Result<AppConfig, BootstrapError> {
    Ok(AppConfig::load(options)?)
}

pub fn bootstrap_with_config(config: AppConfig) -> Application {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        config_path = %config.config_path().display(),
        "starting application bootstrap"
    );

    let store: Arc<dyn DatabaseStore> =
        Arc::new(JsonFileStore::new(config.storage.database_path.clone()));
    let tracker = Arc::new(ActivityTracker::open(store, config.tracker_settings()));
    let summary = tracker.summary();
    info!(
        event_name = "system.bootstrap.database_loaded",
        correlation_id = "bootstrap",
        database_path = %config.storage.database_path.display(),
        users = summary.users,
        activities = summary.activities,
        tickets = summary.tickets,
        "activity database ready"
    );

    let bot = Arc::new(BotContext::from_config(&config, tracker.clone()));
    let runner = GatewayRunner::offline(bot_dispatcher(bot.clone()));
    let gateway = runner.gateway();

    Application { config, tracker, bot, gateway, runner }
}
