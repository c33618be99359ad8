use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tally_chat::messages;
use tally_core::config::AppConfig;
use tally_core::domain::UserId;
use tally_core::store::{DatabaseStore, JsonFileStore, MemoryStore};
use tally_core::tracker::ActivityTracker;

use super::{load_options, CommandResult};

/// Renders the `/stats` report for `user_id` without connecting to chat.
///
/// The database is read into memory; nothing is written back.
pub fn run(config_path: Option<&Path>, user_id: &str) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("stats", "config_validation", error.to_string(), 2);
        }
    };

    let store = JsonFileStore::new(config.storage.database_path.clone());
    let database = match store.load() {
        Ok(database) => database.unwrap_or_default(),
        Err(error) => {
            return CommandResult::failure("stats", "database_read", error.to_string(), 3);
        }
    };

    let tracker = ActivityTracker::open(
        Arc::new(MemoryStore::with_database(database)),
        config.tracker_settings(),
    );
    let stats = tracker.user_stats_at(&UserId::from(user_id), Utc::now());

    CommandResult { exit_code: 0, output: messages::stats_report(&stats) }
}
