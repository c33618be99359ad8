use std::path::Path;

use serde::Serialize;
use tally_core::config::AppConfig;
use tally_core::store::{DatabaseStore, JsonFileStore};

use super::{load_options, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(config_path: Option<&Path>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(config_path: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(load_options(config_path)) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_database(&config));
            checks.push(check_reminder_channel(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_readable",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "reminder_channel",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let config_loaded = checks.first().is_some_and(|check| check.status == CheckStatus::Pass);
    let all_pass = config_loaded && checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let store = JsonFileStore::new(config.storage.database_path.clone());
    match store.load() {
        Ok(Some(database)) => DoctorCheck {
            name: "database_readable",
            status: CheckStatus::Pass,
            details: format!(
                "`{}` holds {} users, {} activities, {} tickets",
                store.describe(),
                database.user_activities.len(),
                database.activity_count(),
                database.ticket_count()
            ),
        },
        Ok(None) => DoctorCheck {
            name: "database_readable",
            status: CheckStatus::Pass,
            details: format!(
                "`{}` does not exist yet; it is created on first check-in",
                store.describe()
            ),
        },
        Err(error) => DoctorCheck {
            name: "database_readable",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_reminder_channel(config: &AppConfig) -> DoctorCheck {
    match config.reminder_channel() {
        Some(channel_id) => DoctorCheck {
            name: "reminder_channel",
            status: CheckStatus::Pass,
            details: format!(
                "reminders go to `{channel_id}` daily at {} after {}h without a check-in",
                config.reminders.time, config.reminders.frequency_hours
            ),
        },
        None => DoctorCheck {
            name: "reminder_channel",
            status: CheckStatus::Skipped,
            details: "no reminderChannelID or channelID configured; reminders are disabled"
                .to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
