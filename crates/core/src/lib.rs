pub mod config;
pub mod domain;
pub mod errors;
pub mod io;
pub mod reminder;
pub mod stats;
pub mod store;
pub mod tracker;

pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::{
    ActivityRecord, ChannelId, Database, Ticket, TicketId, TicketStatus, UserId,
};
pub use errors::DomainError;
pub use reminder::{Reminder, ReminderSchedule, ReminderTime};
pub use stats::ProjectStats;
pub use store::{DatabaseStore, JsonFileStore, MemoryStore, StoreError};
pub use tracker::{ActivityTracker, CheckInRequest, NewTicket, TrackerSettings, TrackerSummary};
