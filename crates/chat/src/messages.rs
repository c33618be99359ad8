//! Reply text rendered back into chat channels.

use tally_core::domain::{Ticket, TicketId, TicketStatus};
use tally_core::reminder::Reminder;
use tally_core::stats::ProjectStats;

pub const TICKET_USAGE: &str =
    "Usage: !ticket create <title> | <description> or !ticket done <ticket-id>";
pub const TICKET_CREATE_USAGE: &str = "Usage: !ticket create <title> | <description>";
pub const TICKET_DONE_USAGE: &str = "Usage: !ticket done <ticket-id>";
pub const TICKET_UNKNOWN: &str =
    "Unknown ticket command. Use: !ticket create, !ticket done, or !ticket list";
pub const NO_TICKETS: &str = "No tickets found for this project";
pub const TRACK_USAGE: &str = "Usage: /track project-name:<name>";
pub const CONFIG_SAVE_FAILED: &str = "Error saving configuration";
pub const NO_TRACKED_PROJECTS: &str =
    "You don't have any tracked projects yet. Use `/track` in a channel to start tracking.";

/// Accumulates a markdown reply line by line.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    text: String,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(self, text: &str) -> Self {
        self.line(format!("# {text}")).blank()
    }

    pub fn heading(self, text: &str) -> Self {
        self.line(format!("## {text}"))
    }

    pub fn bullet(self, label: &str, value: impl AsRef<str>) -> Self {
        self.line(format!("- **{label}**: {}", value.as_ref()))
    }

    pub fn line(mut self, text: impl AsRef<str>) -> Self {
        self.text.push_str(text.as_ref());
        self.text.push('\n');
        self
    }

    pub fn blank(mut self) -> Self {
        self.text.push('\n');
        self
    }

    pub fn build(self) -> String {
        self.text
    }
}

pub fn ticket_created(ticket: &Ticket) -> String {
    format!("✅ Created ticket **#{}**: {}", ticket.id, ticket.title)
}

pub fn ticket_completed(ticket_id: &TicketId) -> String {
    format!("🎉 Completed ticket **#{ticket_id}**! Great job!")
}

pub fn ticket_not_found(ticket_id: &TicketId) -> String {
    format!("❌ Could not find ticket **#{ticket_id}**")
}

pub fn status_label(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Done => "✅ Done",
        TicketStatus::Open | TicketStatus::InProgress => "⏳ In Progress",
    }
}

pub fn ticket_list(tickets: &[Ticket]) -> String {
    if tickets.is_empty() {
        return NO_TICKETS.to_owned();
    }

    tickets
        .iter()
        .fold(MessageBuilder::new().line("**Your Tickets:**"), |message, ticket| {
            message.line(format!(
                "**#{}**: {} - {}",
                ticket.id,
                ticket.title,
                status_label(ticket.status)
            ))
        })
        .build()
}

pub fn tracking_started(project_name: &str) -> String {
    format!(
        "Now tracking this channel for project **{project_name}**!\n\n\
         Use this channel for daily updates, and I'll keep track of your progress."
    )
}

pub fn stats_report(stats: &[ProjectStats]) -> String {
    if stats.is_empty() {
        return NO_TRACKED_PROJECTS.to_owned();
    }

    stats
        .iter()
        .fold(MessageBuilder::new().title("Your Project Stats"), |message, project| {
            message
                .heading(&project.project_name)
                .bullet(
                    "Tickets",
                    format!(
                        "{}/{} completed ({:.1}%)",
                        project.completed_tickets, project.total_tickets, project.percentage
                    ),
                )
                .bullet("Last Check-in", format!("{} days ago", project.days_since_check_in))
                .bullet("Check-ins Last Week", project.check_ins_last_week.to_string())
                .blank()
        })
        .build()
}

/// Projects without tickets are left out of the report.
pub fn progress_report(stats: &[ProjectStats]) -> String {
    if stats.is_empty() {
        return NO_TRACKED_PROJECTS.to_owned();
    }

    stats
        .iter()
        .filter(|project| project.has_tickets())
        .fold(MessageBuilder::new().title("Your Project Progress"), |message, project| {
            message
                .heading(&project.project_name)
                .line(format!(
                    "{} {:.1}% ({}/{})",
                    project.progress_bar(),
                    project.percentage,
                    project.completed_tickets,
                    project.total_tickets
                ))
                .blank()
        })
        .build()
}

pub fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

pub fn reminder(reminder: &Reminder) -> String {
    format!(
        "{}, you haven't checked in on project **{}** for {} hours. \
         Remember to update your progress!",
        mention(reminder.user_id.as_str()),
        reminder.project_name,
        reminder.hours_since_check_in
    )
}
