use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::atomic_write;
use crate::reminder::{ReminderSchedule, ReminderTime, ReminderTimeError, MAX_FREQUENCY_HOURS};
use crate::tracker::TrackerSettings;

/// History cap applied when the bot watches a single channel.
pub const SINGLE_CHANNEL_HISTORY_LIMIT: usize = 30;
pub const DEFAULT_CONFIG_FILE: &str = "tally.json";
const TRACKED_CHANNELS_KEY: &str = "trackedChannels";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub tracking: TrackingConfig,
    pub reminders: ReminderConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// The file the configuration was read from, if any.
    pub source_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub token: SecretString,
    pub presence: String,
    /// Emoji added to qualifying check-in messages; empty disables reactions.
    pub check_in_reaction: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingConfig {
    /// channel id -> project label
    pub tracked_channels: BTreeMap<String, String>,
    pub monitored_channel: Option<String>,
    /// Label used for `monitored_channel`.
    pub project_name: String,
    pub max_check_ins: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderConfig {
    pub time: ReminderTime,
    pub frequency_hours: u64,
    pub channel_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub token: Option<String>,
    pub database_path: Option<PathBuf>,
    pub reminder_time: Option<String>,
    pub check_in_frequency: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseJson { path: PathBuf, source: serde_json::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseToml { path: PathBuf, source: toml::de::Error },
    #[error("could not write config file `{path}`: {source}")]
    WriteFile { path: PathBuf, source: std::io::Error },
    #[error("could not encode config file `{path}`: {message}")]
    EncodeFile { path: PathBuf, message: String },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error(transparent)]
    ReminderTime(#[from] ReminderTimeError),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chat: ChatConfig {
                token: String::new().into(),
                presence: "Tracking your progress!".to_string(),
                check_in_reaction: "✅".to_string(),
            },
            tracking: TrackingConfig {
                tracked_channels: BTreeMap::new(),
                monitored_channel: None,
                project_name: "general".to_string(),
                max_check_ins: None,
            },
            reminders: ReminderConfig {
                time: ReminderTime::default(),
                frequency_hours: 24,
                channel_id: None,
            },
            storage: StorageConfig { database_path: PathBuf::from("accountability_data.json") },
            server: ServerConfig {
                enabled: false,
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            source_path: None,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl TrackingConfig {
    /// Every channel whose messages count as check-ins, with its project label.
    pub fn channel_projects(&self) -> BTreeMap<String, String> {
        let mut channels = self.tracked_channels.clone();
        if let Some(channel_id) = &self.monitored_channel {
            channels.entry(channel_id.clone()).or_insert_with(|| self.project_name.clone());
        }
        channels
    }

    pub fn history_limit(&self) -> Option<usize> {
        self.max_check_ins.or_else(|| {
            (self.monitored_channel.is_some() && self.tracked_channels.is_empty())
                .then_some(SINGLE_CHANNEL_HISTORY_LIMIT)
        })
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
            config.source_path = Some(path);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides)?;
        config.validate()?;

        Ok(config)
    }

    /// Where `/track` writes the channel map back to.
    pub fn config_path(&self) -> PathBuf {
        self.source_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Reminders go to the dedicated channel, or the single monitored channel.
    pub fn reminder_channel(&self) -> Option<&str> {
        self.reminders.channel_id.as_deref().or(self.tracking.monitored_channel.as_deref())
    }

    pub fn reminder_schedule(&self) -> ReminderSchedule {
        ReminderSchedule::new(self.reminders.time, self.reminders.frequency_hours)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings { history_limit: self.tracking.history_limit() }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(token) = patch.token {
            self.chat.token = secret_value(token); // ubs:ignore
        }
        if let Some(presence) = patch.presence {
            self.chat.presence = presence;
        }
        if let Some(reaction) = patch.check_in_reaction {
            self.chat.check_in_reaction = reaction;
        }

        if let Some(tracked_channels) = patch.tracked_channels {
            self.tracking.tracked_channels = tracked_channels;
        }
        if let Some(channel_id) = non_empty(patch.channel_id) {
            self.tracking.monitored_channel = Some(channel_id);
        }
        if let Some(project_name) = patch.project_name {
            self.tracking.project_name = project_name;
        }
        if let Some(max_check_ins) = patch.max_check_ins {
            self.tracking.max_check_ins = Some(max_check_ins);
        }

        if let Some(reminder_time) = patch.reminder_time {
            self.reminders.time = reminder_time.parse()?;
        }
        if let Some(frequency) = patch.check_in_frequency {
            self.reminders.frequency_hours = frequency;
        }
        if let Some(channel_id) = non_empty(patch.reminder_channel_id) {
            self.reminders.channel_id = Some(channel_id);
        }

        if let Some(database_path) = patch.database_path {
            self.storage.database_path = database_path;
        }

        if let Some(server) = patch.server {
            if let Some(enabled) = server.enabled {
                self.server.enabled = enabled;
            }
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TALLY_TOKEN") {
            self.chat.token = secret_value(value); // ubs:ignore
        }
        if let Some(value) = read_env("TALLY_PRESENCE") {
            self.chat.presence = value;
        }

        if let Some(value) = read_env("TALLY_CHANNEL_ID") {
            self.tracking.monitored_channel = Some(value);
        }
        if let Some(value) = read_env("TALLY_MAX_CHECK_INS") {
            self.tracking.max_check_ins = Some(parse_usize("TALLY_MAX_CHECK_INS", &value)?);
        }

        if let Some(value) = read_env("TALLY_REMINDER_TIME") {
            self.reminders.time = value.parse()?;
        }
        if let Some(value) = read_env("TALLY_CHECK_IN_FREQUENCY") {
            self.reminders.frequency_hours = parse_u64("TALLY_CHECK_IN_FREQUENCY", &value)?;
        }
        if let Some(value) = read_env("TALLY_REMINDER_CHANNEL_ID") {
            self.reminders.channel_id = Some(value);
        }

        if let Some(value) = read_env("TALLY_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("TALLY_SERVER_ENABLED") {
            self.server.enabled = parse_bool("TALLY_SERVER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TALLY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TALLY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("TALLY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level = read_env("TALLY_LOGGING_LEVEL").or_else(|| read_env("TALLY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TALLY_LOGGING_FORMAT").or_else(|| read_env("TALLY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(token) = overrides.token {
            self.chat.token = secret_value(token); // ubs:ignore
        }
        if let Some(database_path) = overrides.database_path {
            self.storage.database_path = database_path;
        }
        if let Some(reminder_time) = overrides.reminder_time {
            self.reminders.time = reminder_time.parse()?;
        }
        if let Some(frequency) = overrides.check_in_frequency {
            self.reminders.frequency_hours = frequency;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chat(&self.chat)?;
        validate_tracking(&self.tracking)?;
        validate_reminders(&self.reminders)?;
        validate_storage(&self.storage)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Rewrites only the `trackedChannels` entry of the config file at `path`,
/// leaving every other key (including `${VAR}` placeholders) untouched.
pub fn write_tracked_channels(
    path: &Path,
    channels: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(ConfigError::ReadFile { path: path.to_path_buf(), source }),
    };

    let encoded = if is_toml(path) {
        let mut document = if raw.trim().is_empty() {
            toml::Table::new()
        } else {
            toml::from_str::<toml::Table>(&raw)
                .map_err(|source| ConfigError::ParseToml { path: path.to_path_buf(), source })?
        };
        let table = channels
            .iter()
            .map(|(channel, project)| (channel.clone(), toml::Value::String(project.clone())))
            .collect::<toml::Table>();
        document.insert(TRACKED_CHANNELS_KEY.to_string(), toml::Value::Table(table));
        toml::to_string_pretty(&document).map_err(|error| ConfigError::EncodeFile {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?
    } else {
        let mut document = if raw.trim().is_empty() {
            serde_json::Map::new()
        } else {
            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&raw)
                .map_err(|source| ConfigError::ParseJson { path: path.to_path_buf(), source })?
        };
        let object = channels
            .iter()
            .map(|(channel, project)| (channel.clone(), serde_json::Value::String(project.clone())))
            .collect::<serde_json::Map<_, _>>();
        document.insert(TRACKED_CHANNELS_KEY.to_string(), serde_json::Value::Object(object));
        serde_json::to_string_pretty(&document).map_err(|error| ConfigError::EncodeFile {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?
    };

    atomic_write(path, encoded.as_bytes())
        .map_err(|source| ConfigError::WriteFile { path: path.to_path_buf(), source })
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [
        PathBuf::from("tally.json"),
        PathBuf::from("config.json"),
        PathBuf::from("config/tally.json"),
        PathBuf::from("tally.toml"),
    ]
    .into_iter()
    .find(|path| path.exists())
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension.eq_ignore_ascii_case("toml"))
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    if is_toml(path) {
        toml::from_str::<ConfigPatch>(&interpolated)
            .map_err(|source| ConfigError::ParseToml { path: path.to_path_buf(), source })
    } else {
        serde_json::from_str::<ConfigPatch>(&interpolated)
            .map_err(|source| ConfigError::ParseJson { path: path.to_path_buf(), source })
    }
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    let token = chat.token.expose_secret(); // ubs:ignore
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "token is required. Set `token` in the config file or TALLY_TOKEN".to_string(),
        ));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation("token must not contain whitespace".to_string()));
    }
    Ok(())
}

fn validate_tracking(tracking: &TrackingConfig) -> Result<(), ConfigError> {
    for (channel_id, project) in &tracking.tracked_channels {
        if channel_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "trackedChannels must not contain an empty channel id".to_string(),
            ));
        }
        if project.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "trackedChannels.{channel_id} must name a project"
            )));
        }
    }

    if tracking.monitored_channel.is_some() && tracking.project_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "projectName must not be empty when channelID is set".to_string(),
        ));
    }

    if tracking.max_check_ins == Some(0) {
        return Err(ConfigError::Validation(
            "maxCheckIns must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_reminders(reminders: &ReminderConfig) -> Result<(), ConfigError> {
    if reminders.frequency_hours == 0 || reminders.frequency_hours > MAX_FREQUENCY_HOURS {
        return Err(ConfigError::Validation(format!(
            "checkInFrequency must be in range 1..={MAX_FREQUENCY_HOURS} hours"
        )));
    }
    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("databasePath must not be empty".to_string()));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.enabled && server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.healthCheckPort must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigPatch {
    token: Option<String>,
    presence: Option<String>,
    check_in_reaction: Option<String>,
    tracked_channels: Option<BTreeMap<String, String>>,
    #[serde(rename = "channelID")]
    channel_id: Option<String>,
    project_name: Option<String>,
    max_check_ins: Option<usize>,
    #[serde(rename = "reminderChannelID")]
    reminder_channel_id: Option<String>,
    check_in_frequency: Option<u64>,
    reminder_time: Option<String>,
    database_path: Option<PathBuf>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerPatch {
    enabled: Option<bool>,
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
