pub mod activity;
pub mod ticket;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

pub use activity::ActivityRecord;
pub use ticket::{Ticket, TicketId, TicketStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(UserId);
string_id!(ChannelId);

/// Every tracked record, keyed by user and then by the channel the user checks in from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_activities: BTreeMap<UserId, BTreeMap<ChannelId, ActivityRecord>>,
}

impl Database {
    pub fn activity(&self, user_id: &UserId, channel_id: &ChannelId) -> Option<&ActivityRecord> {
        self.user_activities.get(user_id).and_then(|channels| channels.get(channel_id))
    }

    pub fn activity_mut(
        &mut self,
        user_id: &UserId,
        channel_id: &ChannelId,
    ) -> Option<&mut ActivityRecord> {
        self.user_activities.get_mut(user_id).and_then(|channels| channels.get_mut(channel_id))
    }

    pub fn activity_count(&self) -> usize {
        self.user_activities.values().map(BTreeMap::len).sum()
    }

    pub fn ticket_count(&self) -> usize {
        self.user_activities
            .values()
            .flat_map(BTreeMap::values)
            .map(|record| record.tickets.len())
            .sum()
    }
}

// Files written by older builds carry `null` for empty collections.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
