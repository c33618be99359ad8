use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tally_core::config::{write_tracked_channels, AppConfig, ConfigError};
use tally_core::tracker::ActivityTracker;
use tracing::info;

/// Channel → project labels that count as check-in channels.
///
/// `/track` adds entries at runtime; the map is written back into the config
/// file so the channel survives a restart.
#[derive(Debug)]
pub struct ChannelRegistry {
    tracked: RwLock<BTreeMap<String, String>>,
    monitored: Option<(String, String)>,
    config_path: Option<PathBuf>,
}

impl ChannelRegistry {
    pub fn new(
        tracked: BTreeMap<String, String>,
        monitored: Option<(String, String)>,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self { tracked: RwLock::new(tracked), monitored, config_path }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let monitored = config
            .tracking
            .monitored_channel
            .clone()
            .map(|channel_id| (channel_id, config.tracking.project_name.clone()));
        Self::new(config.tracking.tracked_channels.clone(), monitored, Some(config.config_path()))
    }

    pub fn project_for(&self, channel_id: &str) -> Option<String> {
        let tracked = self.tracked.read().unwrap_or_else(PoisonError::into_inner);
        tracked.get(channel_id).cloned().or_else(|| {
            self.monitored
                .as_ref()
                .filter(|(monitored, _)| monitored == channel_id)
                .map(|(_, project)| project.clone())
        })
    }

    pub fn tracked(&self) -> BTreeMap<String, String> {
        self.tracked.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Maps `channel_id` to `project_name` and persists the map. The in-memory
    /// entry is rolled back when the config file cannot be written.
    pub fn track(&self, channel_id: &str, project_name: &str) -> Result<(), ConfigError> {
        let mut tracked = self.tracked.write().unwrap_or_else(PoisonError::into_inner);
        let previous = tracked.insert(channel_id.to_owned(), project_name.to_owned());

        if let Some(path) = &self.config_path {
            if let Err(error) = write_tracked_channels(path, &tracked) {
                match previous {
                    Some(project) => tracked.insert(channel_id.to_owned(), project),
                    None => tracked.remove(channel_id),
                };
                return Err(error);
            }
        }

        info!(
            event_name = "chat.channel.tracked",
            channel_id,
            project_name,
            tracked_channels = tracked.len(),
            "channel is now tracked"
        );
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotSettings {
    /// Empty disables check-in reactions.
    pub check_in_reaction: String,
    pub presence: String,
}

/// Everything the event handlers share; built once at startup.
pub struct BotContext {
    pub tracker: Arc<ActivityTracker>,
    pub channels: ChannelRegistry,
    pub settings: BotSettings,
    bot_user_id: RwLock<Option<String>>,
}

impl BotContext {
    pub fn new(
        tracker: Arc<ActivityTracker>,
        channels: ChannelRegistry,
        settings: BotSettings,
    ) -> Self {
        Self { tracker, channels, settings, bot_user_id: RwLock::new(None) }
    }

    pub fn from_config(config: &AppConfig, tracker: Arc<ActivityTracker>) -> Self {
        Self::new(
            tracker,
            ChannelRegistry::from_config(config),
            BotSettings {
                check_in_reaction: config.chat.check_in_reaction.clone(),
                presence: config.chat.presence.clone(),
            },
        )
    }

    pub fn set_bot_user(&self, user_id: &str) {
        let mut bot_user_id = self.bot_user_id.write().unwrap_or_else(PoisonError::into_inner);
        *bot_user_id = Some(user_id.to_owned());
    }

    pub fn is_bot_user(&self, user_id: &str) -> bool {
        self.bot_user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .is_some_and(|bot| bot == user_id)
    }
}
