use chrono::Utc;
use serde::Serialize;
use tally_core::domain::{ChannelId, TicketId, UserId};
use tally_core::tracker::NewTicket;
use tracing::{debug, warn};

use crate::context::BotContext;
use crate::messages;

pub const TICKET_PREFIX: &str = "!ticket";
pub const PROJECT_NAME_OPTION: &str = "project-name";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketCommand {
    Usage,
    CreateUsage,
    Create { title: String, description: String },
    DoneUsage,
    Done { ticket_id: TicketId },
    List,
    Unknown { action: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Track { project_name: Option<String> },
    Stats,
    Progress,
    Unknown { name: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
}

impl CommandDefinition {
    fn new(name: &str, description: &str) -> Self {
        Self { name: name.to_owned(), description: description.to_owned(), options: Vec::new() }
    }

    fn required_string(mut self, name: &str, description: &str) -> Self {
        self.options.push(CommandOption {
            name: name.to_owned(),
            description: description.to_owned(),
            required: true,
        });
        self
    }
}

/// Slash commands registered when the session becomes ready.
pub fn command_definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new("track", "Track a channel for project updates")
            .required_string(PROJECT_NAME_OPTION, "The name of the project to track"),
        CommandDefinition::new("stats", "Show your project stats"),
        CommandDefinition::new("progress", "Show progress bar for completion of tickets"),
    ]
}

/// Parses a `!ticket` message. Returns `None` when the content is not a ticket
/// command at all.
///
/// Words are split on single spaces into at most three parts, so everything
/// after the action is kept verbatim as the argument.
pub fn parse_ticket_command(content: &str) -> Option<TicketCommand> {
    if !content.starts_with(TICKET_PREFIX) {
        return None;
    }

    let mut parts = content.splitn(3, ' ');
    parts.next();
    let Some(action) = parts.next() else {
        return Some(TicketCommand::Usage);
    };
    let argument = parts.next();

    Some(match action {
        "create" => match argument {
            None => TicketCommand::CreateUsage,
            Some(argument) => {
                let (title, description) = argument.split_once('|').unwrap_or((argument, ""));
                TicketCommand::Create {
                    title: title.trim().to_owned(),
                    description: description.trim().to_owned(),
                }
            }
        },
        "done" => match argument {
            None => TicketCommand::DoneUsage,
            Some(argument) => TicketCommand::Done { ticket_id: TicketId::from(argument) },
        },
        "list" => TicketCommand::List,
        other => TicketCommand::Unknown { action: other.to_owned() },
    })
}

pub fn parse_slash_command(name: &str, project_name: Option<&str>) -> SlashCommand {
    match name {
        "track" => SlashCommand::Track {
            project_name: project_name
                .map(str::trim)
                .filter(|project| !project.is_empty())
                .map(str::to_owned),
        },
        "stats" => SlashCommand::Stats,
        "progress" => SlashCommand::Progress,
        other => SlashCommand::Unknown { name: other.to_owned() },
    }
}

/// Who issued a command and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub user_id: UserId,
    pub channel_id: ChannelId,
}

pub struct CommandRouter<'a> {
    context: &'a BotContext,
}

impl<'a> CommandRouter<'a> {
    pub fn new(context: &'a BotContext) -> Self {
        Self { context }
    }

    pub fn route_ticket(
        &self,
        command: TicketCommand,
        invocation: &Invocation,
        project_name: &str,
    ) -> String {
        let tracker = &self.context.tracker;
        match command {
            TicketCommand::Usage => messages::TICKET_USAGE.to_owned(),
            TicketCommand::CreateUsage => messages::TICKET_CREATE_USAGE.to_owned(),
            TicketCommand::DoneUsage => messages::TICKET_DONE_USAGE.to_owned(),
            TicketCommand::Unknown { action } => {
                debug!(
                    event_name = "chat.ticket.unknown_action",
                    action = %action,
                    "unknown ticket action"
                );
                messages::TICKET_UNKNOWN.to_owned()
            }
            TicketCommand::Create { title, description } => {
                let ticket = tracker.create_ticket(
                    &invocation.user_id,
                    &invocation.channel_id,
                    project_name,
                    NewTicket { title, description },
                );
                messages::ticket_created(&ticket)
            }
            TicketCommand::Done { ticket_id } => {
                let Invocation { user_id, channel_id } = invocation;
                match tracker.complete_ticket(user_id, channel_id, &ticket_id) {
                    Ok(_) => messages::ticket_completed(&ticket_id),
                    Err(_) => messages::ticket_not_found(&ticket_id),
                }
            }
            TicketCommand::List => {
                let tickets = tracker.list_tickets(&invocation.user_id, &invocation.channel_id);
                messages::ticket_list(&tickets)
            }
        }
    }

    /// `None` for commands this bot does not own.
    pub fn route_slash(&self, command: SlashCommand, invocation: &Invocation) -> Option<String> {
        match command {
            SlashCommand::Track { project_name: None } => Some(messages::TRACK_USAGE.to_owned()),
            SlashCommand::Track { project_name: Some(project_name) } => {
                match self.context.channels.track(invocation.channel_id.as_str(), &project_name) {
                    Ok(()) => Some(messages::tracking_started(&project_name)),
                    Err(error) => {
                        warn!(
                            event_name = "chat.channel.track_failed",
                            channel_id = %invocation.channel_id,
                            error = %error,
                            "could not persist tracked channel"
                        );
                        Some(messages::CONFIG_SAVE_FAILED.to_owned())
                    }
                }
            }
            SlashCommand::Stats => {
                let stats = self.context.tracker.user_stats_at(&invocation.user_id, Utc::now());
                Some(messages::stats_report(&stats))
            }
            SlashCommand::Progress => {
                let stats = self.context.tracker.user_stats_at(&invocation.user_id, Utc::now());
                Some(messages::progress_report(&stats))
            }
            SlashCommand::Unknown { name } => {
                debug!(
                    event_name = "chat.command.unknown",
                    command = %name,
                    "ignoring unknown command"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use tally_core::domain::{ChannelId, TicketId, UserId};
    use tally_core::store::MemoryStore;
    use tally_core::tracker::{ActivityTracker, TrackerSettings};

    use super::{
        command_definitions, parse_slash_command, parse_ticket_command, CommandRouter, Invocation,
        SlashCommand, TicketCommand,
    };
    use crate::context::{BotContext, BotSettings, ChannelRegistry};
    use crate::messages;

    fn context() -> BotContext {
        let tracker = Arc::new(ActivityTracker::new(
            Arc::new(MemoryStore::default()),
            TrackerSettings::default(),
        ));
        BotContext::new(
            tracker,
            ChannelRegistry::new(BTreeMap::new(), None, None),
            BotSettings { check_in_reaction: "✅".to_owned(), presence: "busy".to_owned() },
        )
    }

    fn invocation() -> Invocation {
        Invocation { user_id: UserId::from("U1"), channel_id: ChannelId::from("C1") }
    }

    #[test]
    fn parses_ticket_command_family() {
        assert_eq!(parse_ticket_command("hello"), None);
        assert_eq!(parse_ticket_command("!ticket"), Some(TicketCommand::Usage));
        assert_eq!(parse_ticket_command("!ticket create"), Some(TicketCommand::CreateUsage));
        assert_eq!(parse_ticket_command("!ticket done"), Some(TicketCommand::DoneUsage));
        assert_eq!(parse_ticket_command("!ticket list"), Some(TicketCommand::List));
        assert_eq!(
            parse_ticket_command("!ticket create Fix login | users see 500s | on retry"),
            Some(TicketCommand::Create {
                title: "Fix login".to_owned(),
                description: "users see 500s | on retry".to_owned(),
            })
        );
        assert_eq!(
            parse_ticket_command("!ticket create Write tests"),
            Some(TicketCommand::Create {
                title: "Write tests".to_owned(),
                description: String::new(),
            })
        );
        assert_eq!(
            parse_ticket_command("!ticket done  2 "),
            Some(TicketCommand::Done { ticket_id: TicketId::from("2") })
        );
        assert_eq!(
            parse_ticket_command("!ticket close 2"),
            Some(TicketCommand::Unknown { action: "close".to_owned() })
        );
    }

    #[test]
    fn parses_slash_commands() {
        assert_eq!(
            parse_slash_command("track", Some(" atlas ")),
            SlashCommand::Track { project_name: Some("atlas".to_owned()) }
        );
        assert_eq!(
            parse_slash_command("track", Some("  ")),
            SlashCommand::Track { project_name: None }
        );
        assert_eq!(parse_slash_command("stats", None), SlashCommand::Stats);
        assert_eq!(
            parse_slash_command("deploy", None),
            SlashCommand::Unknown { name: "deploy".to_owned() }
        );
    }

    #[test]
    fn definitions_cover_track_stats_and_progress() {
        let definitions = command_definitions();
        let names = definitions.iter().map(|command| command.name.as_str()).collect::<Vec<_>>();

        assert_eq!(names, vec!["track", "stats", "progress"]);
        assert_eq!(definitions[0].options.len(), 1);
        assert!(definitions[0].options[0].required);
    }

    #[test]
    fn ticket_lifecycle_through_the_router() {
        let context = context();
        let router = CommandRouter::new(&context);
        let invocation = invocation();

        let created = router.route_ticket(
            TicketCommand::Create { title: "Ship".to_owned(), description: String::new() },
            &invocation,
            "atlas",
        );
        assert_eq!(created, "✅ Created ticket **#1**: Ship");

        let missing = router.route_ticket(
            TicketCommand::Done { ticket_id: TicketId::from("7") },
            &invocation,
            "atlas",
        );
        assert_eq!(missing, "❌ Could not find ticket **#7**");

        let done = router.route_ticket(
            TicketCommand::Done { ticket_id: TicketId::from("1") },
            &invocation,
            "atlas",
        );
        assert_eq!(done, "🎉 Completed ticket **#1**! Great job!");

        let listed = router.route_ticket(TicketCommand::List, &invocation, "atlas");
        assert_eq!(listed, "**Your Tickets:**\n**#1**: Ship - ✅ Done\n");
    }

    #[test]
    fn stats_without_activity_points_to_track() {
        let context = context();
        let router = CommandRouter::new(&context);

        assert_eq!(
            router.route_slash(SlashCommand::Stats, &invocation()).as_deref(),
            Some(messages::NO_TRACKED_PROJECTS)
        );
        assert_eq!(
            router.route_slash(SlashCommand::Unknown { name: "deploy".to_owned() }, &invocation()),
            None
        );
    }

    #[test]
    fn track_registers_the_channel() {
        let context = context();
        let router = CommandRouter::new(&context);

        let track = SlashCommand::Track { project_name: Some("atlas".to_owned()) };
        let reply = router.route_slash(track, &invocation()).expect("track replies");

        assert!(reply.starts_with("Now tracking this channel for project **atlas**!"));
        assert_eq!(context.channels.project_for("C1").as_deref(), Some("atlas"));
    }

    #[test]
    fn track_reports_a_config_write_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tally.json");
        std::fs::write(&path, "not json").expect("seed broken config");
        let tracker = Arc::new(ActivityTracker::new(
            Arc::new(MemoryStore::default()),
            TrackerSettings::default(),
        ));
        let context = BotContext::new(
            tracker,
            ChannelRegistry::new(BTreeMap::new(), None, Some(path)),
            BotSettings { check_in_reaction: String::new(), presence: "busy".to_owned() },
        );
        let router = CommandRouter::new(&context);

        let track = SlashCommand::Track { project_name: Some("atlas".to_owned()) };
        let reply = router.route_slash(track, &invocation()).expect("track replies");

        assert_eq!(reply, messages::CONFIG_SAVE_FAILED);
        assert_eq!(context.channels.project_for("C1"), None);
    }
}
