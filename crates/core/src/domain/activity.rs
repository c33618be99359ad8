use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_as_default;
use super::ticket::{Ticket, TicketId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub last_check_in: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub check_ins: Vec<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tickets: BTreeMap<TicketId, Ticket>,
    #[serde(default)]
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ActivityRecord {
    pub fn new(project_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            last_check_in: now,
            check_ins: Vec::new(),
            tickets: BTreeMap::new(),
            project_name: project_name.into(),
            display_name: None,
        }
    }

    /// Appends a check-in and returns the timestamp that was stored.
    ///
    /// History never goes backwards: a clock that steps back is clamped to the
    /// newest stored entry. With a `history_limit` the oldest entries are dropped
    /// first until the history fits.
    pub fn record_check_in(
        &mut self,
        now: DateTime<Utc>,
        history_limit: Option<usize>,
    ) -> DateTime<Utc> {
        let at = match self.check_ins.last() {
            Some(newest) if *newest > now => *newest,
            _ => now,
        };

        self.check_ins.push(at);
        self.last_check_in = at;

        if let Some(limit) = history_limit {
            let excess = self.check_ins.len().saturating_sub(limit);
            if excess > 0 {
                self.check_ins.drain(..excess);
            }
        }

        at
    }

    pub fn next_ticket_id(&self) -> TicketId {
        TicketId::for_position(self.tickets.len() + 1)
    }

    pub fn completed_tickets(&self) -> usize {
        self.tickets.values().filter(|ticket| ticket.is_done()).count()
    }

    pub fn total_tickets(&self) -> usize {
        self.tickets.len()
    }

    pub fn check_ins_after(&self, cutoff: DateTime<Utc>) -> usize {
        self.check_ins.iter().filter(|check_in| **check_in > cutoff).count()
    }

    /// Tickets in creation order; ids compare numerically, not as strings.
    pub fn tickets_in_order(&self) -> Vec<&Ticket> {
        let mut tickets = self.tickets.values().collect::<Vec<_>>();
        tickets.sort_by_key(|ticket| (ticket.id.ordinal().unwrap_or(u64::MAX), ticket.id.clone()));
        tickets
    }
}
