use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use serde_json::Value;
use tally_core::config::{resolve_config_path, AppConfig};

use super::load_options;

pub fn run(config_path: Option<&Path>) -> String {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = config.source_path.clone().or_else(|| resolve_config_path(None));
    let file = ConfigFile::load(config_file_path);

    let tracked = config
        .tracking
        .tracked_channels
        .iter()
        .map(|(channel, project)| format!("{channel}={project}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let token = redact_token(config.chat.token.expose_secret());
    lines.push(file.render("token", &token, Some("TALLY_TOKEN")));
    lines.push(file.render("presence", &config.chat.presence, Some("TALLY_PRESENCE")));
    lines.push(file.render("checkInReaction", &config.chat.check_in_reaction, None));
    lines.push(file.render("trackedChannels", or_unset(&tracked), None));
    lines.push(file.render(
        "channelID",
        config.tracking.monitored_channel.as_deref().unwrap_or("<unset>"),
        Some("TALLY_CHANNEL_ID"),
    ));
    lines.push(file.render("projectName", &config.tracking.project_name, None));
    lines.push(file.render(
        "maxCheckIns",
        &config
            .tracking
            .history_limit()
            .map(|limit| limit.to_string())
            .unwrap_or_else(|| "<unbounded>".to_string()),
        Some("TALLY_MAX_CHECK_INS"),
    ));
    lines.push(file.render(
        "reminderChannelID",
        config.reminder_channel().unwrap_or("<unset>"),
        Some("TALLY_REMINDER_CHANNEL_ID"),
    ));
    lines.push(file.render(
        "reminderTime",
        &config.reminders.time.to_string(),
        Some("TALLY_REMINDER_TIME"),
    ));
    lines.push(file.render(
        "checkInFrequency",
        &format!("{}h", config.reminders.frequency_hours),
        Some("TALLY_CHECK_IN_FREQUENCY"),
    ));
    lines.push(file.render(
        "databasePath",
        &config.storage.database_path.display().to_string(),
        Some("TALLY_DATABASE_PATH"),
    ));
    lines.push(file.render(
        "server.enabled",
        &config.server.enabled.to_string(),
        Some("TALLY_SERVER_ENABLED"),
    ));
    lines.push(file.render(
        "server.bindAddress",
        &config.server.bind_address,
        Some("TALLY_SERVER_BIND_ADDRESS"),
    ));
    lines.push(file.render(
        "server.healthCheckPort",
        &config.server.health_check_port.to_string(),
        Some("TALLY_SERVER_HEALTH_CHECK_PORT"),
    ));
    lines.push(file.render("logging.level", &config.logging.level, Some("TALLY_LOGGING_LEVEL")));
    lines.push(file.render(
        "logging.format",
        &format!("{:?}", config.logging.format),
        Some("TALLY_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

/// The raw config document, used only to attribute where a value came from.
struct ConfigFile {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl ConfigFile {
    fn load(path: Option<PathBuf>) -> Self {
        let doc = path.as_deref().and_then(read_doc);
        Self { path, doc }
    }

    fn render(&self, key_path: &str, value: &str, env_key: Option<&str>) -> String {
        format!("- {key_path} = {value} (source: {})", self.source(key_path, env_key))
    }

    fn source(&self, key_path: &str, env_key: Option<&str>) -> String {
        if let Some(env_key) = env_key {
            if env::var_os(env_key).is_some() {
                return format!("env ({env_key})");
            }
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn read_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    let is_toml = path.extension().is_some_and(|extension| extension.eq_ignore_ascii_case("toml"));
    if is_toml {
        let table = raw.parse::<toml::Table>().ok()?;
        serde_json::to_value(table).ok()
    } else {
        serde_json::from_str(&raw).ok()
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "<unset>"
    } else {
        value
    }
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let visible = trimmed.chars().take(4).collect::<String>();
    format!("{visible}***")
}
