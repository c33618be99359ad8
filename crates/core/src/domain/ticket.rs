use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub String);

impl TicketId {
    /// Ids are the 1-based position of the ticket within its user/channel record.
    pub fn for_position(position: usize) -> Self {
        Self(position.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn ordinal(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_owned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    /// Accepted in stored files; nothing moves a ticket into this state.
    InProgress,
    Done,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "deserialize_completed_at",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project_name: String,
}

impl Ticket {
    pub fn open(
        id: TicketId,
        title: impl Into<String>,
        description: impl Into<String>,
        project_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            status: TicketStatus::Open,
            created_at,
            completed_at: None,
            project_name: project_name.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == TicketStatus::Done
    }

    /// Marks the ticket done from either open state. Done is terminal, so
    /// completing a done ticket keeps the first completion time.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        if self.is_done() {
            return;
        }

        self.status = TicketStatus::Done;
        self.completed_at = Some(now);
    }
}

// A zero timestamp (year 1) is how legacy files spell "not completed yet".
fn deserialize_completed_at<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(value.filter(|timestamp| timestamp.year() > 1))
}
