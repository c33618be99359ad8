//! The activity tracker: one process-wide database behind a single read/write lock.
//!
//! Every mutation persists the whole database while still holding the write lock,
//! so a slow disk delays the next check-in rather than reordering saves. Read-only
//! queries (ticket lists, stats, reminder scans) take the shared lock.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::domain::{ActivityRecord, ChannelId, Database, Ticket, TicketId, UserId};
use crate::errors::DomainError;
use crate::reminder::Reminder;
use crate::stats::ProjectStats;
use crate::store::{DatabaseStore, StoreError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Maximum check-ins kept per record; `None` keeps the full history.
    pub history_limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckInRequest {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub project_name: String,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackerSummary {
    pub users: usize,
    pub activities: usize,
    pub tickets: usize,
}

pub struct ActivityTracker {
    database: RwLock<Database>,
    store: Arc<dyn DatabaseStore>,
    settings: TrackerSettings,
}

impl ActivityTracker {
    pub fn new(store: Arc<dyn DatabaseStore>, settings: TrackerSettings) -> Self {
        Self { database: RwLock::new(Database::default()), store, settings }
    }

    /// Builds a tracker from whatever the store holds. A missing or unreadable
    /// database is logged and the tracker starts empty.
    pub fn open(store: Arc<dyn DatabaseStore>, settings: TrackerSettings) -> Self {
        let tracker = Self::new(store, settings);
        match tracker.store.load() {
            Ok(Some(database)) => {
                info!(
                    event_name = "tracker.database.loaded",
                    store = %tracker.store.describe(),
                    users = database.user_activities.len(),
                    activities = database.activity_count(),
                    "loaded existing database"
                );
                *tracker.write() = database;
            }
            Ok(None) => {
                info!(
                    event_name = "tracker.database.missing",
                    store = %tracker.store.describe(),
                    "no existing database found; starting fresh"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "tracker.database.load_failed",
                    store = %tracker.store.describe(),
                    error = %error,
                    "could not load database; starting with empty state"
                );
            }
        }
        tracker
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn record_check_in(&self, request: &CheckInRequest) -> DateTime<Utc> {
        self.record_check_in_at(request, Utc::now())
    }

    pub fn record_check_in_at(
        &self,
        request: &CheckInRequest,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let mut database = self.write();
        let record = database
            .user_activities
            .entry(request.user_id.clone())
            .or_default()
            .entry(request.channel_id.clone())
            .or_insert_with(|| ActivityRecord::new(request.project_name.clone(), now));

        if request.display_name.is_some() {
            record.display_name = request.display_name.clone();
        }
        let stored = record.record_check_in(now, self.settings.history_limit);
        let history = record.check_ins.len();

        debug!(
            event_name = "tracker.check_in.recorded",
            user_id = %request.user_id,
            channel_id = %request.channel_id,
            history,
            "recorded check-in"
        );
        self.persist(&database);
        stored
    }

    pub fn create_ticket(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        project_name: &str,
        ticket: NewTicket,
    ) -> Ticket {
        self.create_ticket_at(user_id, channel_id, project_name, ticket, Utc::now())
    }

    pub fn create_ticket_at(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        project_name: &str,
        ticket: NewTicket,
        now: DateTime<Utc>,
    ) -> Ticket {
        let mut database = self.write();
        let record = database
            .user_activities
            .entry(user_id.clone())
            .or_default()
            .entry(channel_id.clone())
            .or_insert_with(|| ActivityRecord::new(project_name, now));

        let id = record.next_ticket_id();
        let created =
            Ticket::open(id.clone(), ticket.title, ticket.description, &record.project_name, now);
        record.tickets.insert(id, created.clone());

        info!(
            event_name = "tracker.ticket.created",
            user_id = %user_id,
            channel_id = %channel_id,
            ticket_id = %created.id,
            "created ticket"
        );
        self.persist(&database);
        created
    }

    pub fn complete_ticket(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        ticket_id: &TicketId,
    ) -> Result<Ticket, DomainError> {
        self.complete_ticket_at(user_id, channel_id, ticket_id, Utc::now())
    }

    pub fn complete_ticket_at(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<Ticket, DomainError> {
        let mut database = self.write();
        let ticket = database
            .activity_mut(user_id, channel_id)
            .and_then(|record| record.tickets.get_mut(ticket_id))
            .ok_or(DomainError::TicketNotFound)?;

        ticket.complete(now);
        let completed = ticket.clone();

        info!(
            event_name = "tracker.ticket.completed",
            user_id = %user_id,
            channel_id = %channel_id,
            ticket_id = %ticket_id,
            "completed ticket"
        );
        self.persist(&database);
        Ok(completed)
    }

    /// Tickets for one user/channel in creation order; empty when nothing is tracked.
    pub fn list_tickets(&self, user_id: &UserId, channel_id: &ChannelId) -> Vec<Ticket> {
        self.read()
            .activity(user_id, channel_id)
            .map(|record| record.tickets_in_order().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_check_in(&self, user_id: &UserId, channel_id: &ChannelId) -> Option<DateTime<Utc>> {
        self.read().activity(user_id, channel_id).map(|record| record.last_check_in)
    }

    /// One entry per record the user owns, ordered by project label.
    pub fn user_stats_at(&self, user_id: &UserId, now: DateTime<Utc>) -> Vec<ProjectStats> {
        let database = self.read();
        let Some(channels) = database.user_activities.get(user_id) else {
            return Vec::new();
        };

        let mut stats = channels
            .iter()
            .map(|(channel_id, record)| ProjectStats::from_record(channel_id, record, now))
            .collect::<Vec<_>>();
        stats.sort_by(|left, right| {
            left.project_name
                .cmp(&right.project_name)
                .then_with(|| left.channel_id.cmp(&right.channel_id))
        });
        stats
    }

    /// Every record whose last check-in is strictly older than `threshold`.
    pub fn overdue_at(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<Reminder> {
        let database = self.read();
        database
            .user_activities
            .iter()
            .flat_map(|(user_id, channels)| {
                channels.iter().map(move |(channel_id, record)| (user_id, channel_id, record))
            })
            .filter_map(|(user_id, channel_id, record)| {
                let elapsed = now.signed_duration_since(record.last_check_in);
                (elapsed > threshold).then(|| Reminder {
                    user_id: user_id.clone(),
                    channel_id: channel_id.clone(),
                    project_name: record.project_name.clone(),
                    hours_since_check_in: elapsed.num_hours(),
                })
            })
            .collect()
    }

    pub fn summary(&self) -> TrackerSummary {
        let database = self.read();
        TrackerSummary {
            users: database.user_activities.len(),
            activities: database.activity_count(),
            tickets: database.ticket_count(),
        }
    }

    pub fn snapshot(&self) -> Database {
        self.read().clone()
    }

    pub fn activities_for(&self, user_id: &UserId) -> BTreeMap<ChannelId, ActivityRecord> {
        self.read().user_activities.get(user_id).cloned().unwrap_or_default()
    }

    /// Writes the current state, reporting failure to the caller. Used for the
    /// final save on shutdown.
    pub fn save(&self) -> Result<(), StoreError> {
        let database = self.write();
        self.store.save(&database)
    }

    fn persist(&self, database: &Database) {
        if let Err(error) = self.store.save(database) {
            warn!(
                event_name = "tracker.persist.failed",
                store = %self.store.describe(),
                error = %error,
                "could not persist database; in-memory state is kept"
            );
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Database> {
        self.database.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Database> {
        self.database.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{ActivityTracker, CheckInRequest, NewTicket, TrackerSettings};
    use crate::domain::{ChannelId, TicketId, TicketStatus, UserId};
    use crate::errors::DomainError;
    use crate::store::{DatabaseStore, JsonFileStore, MemoryStore};

    fn request(user: &str, channel: &str) -> CheckInRequest {
        CheckInRequest {
            user_id: UserId::from(user),
            channel_id: ChannelId::from(channel),
            project_name: "atlas".to_owned(),
            display_name: None,
        }
    }

    fn new_ticket(title: &str) -> NewTicket {
        NewTicket { title: title.to_owned(), description: String::new() }
    }

    #[test]
    fn last_check_in_tracks_the_latest_call() {
        let store = Arc::new(MemoryStore::default());
        let tracker = ActivityTracker::new(store.clone(), TrackerSettings::default());
        let start = Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap();

        let mut last = start;
        for offset in 0..5 {
            let at = start + Duration::hours(offset);
            last = tracker.record_check_in_at(&request("U1", "C1"), at);
        }

        let user = UserId::from("U1");
        let channel = ChannelId::from("C1");
        assert_eq!(tracker.last_check_in(&user, &channel), Some(last));
        assert_eq!(last, start + Duration::hours(4));
        assert_eq!(store.save_count(), 5, "every check-in persists");
    }

    #[test]
    fn history_limit_is_applied_per_record() {
        let tracker = ActivityTracker::new(
            Arc::new(MemoryStore::default()),
            TrackerSettings { history_limit: Some(30) },
        );
        let start = Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap();
        for offset in 0..35 {
            tracker.record_check_in_at(&request("U1", "C1"), start + Duration::minutes(offset));
        }

        let snapshot = tracker.snapshot();
        let record = snapshot
            .activity(&UserId::from("U1"), &ChannelId::from("C1"))
            .expect("record exists");
        assert_eq!(record.check_ins.len(), 30);
        assert_eq!(record.check_ins.first().copied(), Some(start + Duration::minutes(5)));
        assert_eq!(record.check_ins.last().copied(), Some(start + Duration::minutes(34)));
    }

    #[test]
    fn ticket_ids_count_up_per_user_and_channel() {
        let tracker =
            ActivityTracker::new(Arc::new(MemoryStore::default()), TrackerSettings::default());
        let user = UserId::from("U1");
        let channel = ChannelId::from("C1");

        let ids = ["a", "b", "c"]
            .into_iter()
            .map(|title| tracker.create_ticket(&user, &channel, "atlas", new_ticket(title)).id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![TicketId::from("1"), TicketId::from("2"), TicketId::from("3")]);

        let other = tracker.create_ticket(&user, &ChannelId::from("C2"), "beta", new_ticket("x"));
        assert_eq!(other.id, TicketId::from("1"));
        assert_eq!(other.project_name, "beta");
    }

    #[test]
    fn completing_unknown_ticket_fails_without_mutation() {
        let store = Arc::new(MemoryStore::default());
        let tracker = ActivityTracker::new(store.clone(), TrackerSettings::default());
        let user = UserId::from("U1");
        let channel = ChannelId::from("C1");

        assert_eq!(
            tracker.complete_ticket(&user, &channel, &TicketId::from("2")),
            Err(DomainError::TicketNotFound)
        );

        tracker.create_ticket(&user, &channel, "atlas", new_ticket("first"));
        let before = tracker.snapshot();
        let saves = store.save_count();

        assert_eq!(
            tracker.complete_ticket(&user, &channel, &TicketId::from("2")),
            Err(DomainError::TicketNotFound)
        );
        assert_eq!(
            tracker.complete_ticket(&UserId::from("U9"), &channel, &TicketId::from("1")),
            Err(DomainError::TicketNotFound)
        );
        assert_eq!(tracker.snapshot(), before);
        assert_eq!(store.save_count(), saves);
    }

    #[test]
    fn completing_ticket_marks_done_and_lists_in_order() {
        let tracker =
            ActivityTracker::new(Arc::new(MemoryStore::default()), TrackerSettings::default());
        let user = UserId::from("U1");
        let channel = ChannelId::from("C1");
        for title in ["one", "two"] {
            tracker.create_ticket(&user, &channel, "atlas", new_ticket(title));
        }

        let done = tracker.complete_ticket(&user, &channel, &TicketId::from("2")).expect("done");
        assert_eq!(done.status, TicketStatus::Done);
        assert!(done.completed_at.is_some());

        let listed = tracker.list_tickets(&user, &channel);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].status, TicketStatus::Open);
        assert_eq!(listed[1].status, TicketStatus::Done);
        assert!(tracker.list_tickets(&user, &ChannelId::from("C9")).is_empty());
    }

    #[test]
    fn ticket_before_any_check_in_initialises_record() {
        let tracker =
            ActivityTracker::new(Arc::new(MemoryStore::default()), TrackerSettings::default());
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 10, 0, 0).unwrap();
        let user = UserId::from("U1");
        let channel = ChannelId::from("C1");

        tracker.create_ticket_at(&user, &channel, "atlas", new_ticket("first"), now);

        assert_eq!(tracker.last_check_in(&user, &channel), Some(now));
        let record = tracker.snapshot();
        let record = record.activity(&user, &channel).expect("record");
        assert!(record.check_ins.is_empty());
        assert_eq!(record.project_name, "atlas");
    }

    #[test]
    fn overdue_scan_uses_strict_threshold() {
        let tracker =
            ActivityTracker::new(Arc::new(MemoryStore::default()), TrackerSettings::default());
        let now = Utc.with_ymd_and_hms(2026, 4, 3, 9, 0, 0).unwrap();
        tracker.record_check_in_at(&request("U1", "C1"), now - Duration::hours(30));
        tracker.record_check_in_at(&request("U2", "C1"), now - Duration::hours(24));
        tracker.record_check_in_at(&request("U3", "C1"), now - Duration::hours(2));

        let overdue = tracker.overdue_at(now, Duration::hours(24));
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].user_id, UserId::from("U1"));
        assert_eq!(overdue[0].hours_since_check_in, 30);
    }

    #[test]
    fn reopened_tracker_sees_persisted_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.json");
        let store: Arc<dyn DatabaseStore> = Arc::new(JsonFileStore::new(&path));

        let tracker = ActivityTracker::new(store.clone(), TrackerSettings::default());
        let now = Utc.with_ymd_and_hms(2026, 4, 3, 9, 0, 0).unwrap();
        tracker.record_check_in_at(&request("U1", "C1"), now);
        tracker.create_ticket_at(
            &UserId::from("U1"),
            &ChannelId::from("C1"),
            "atlas",
            NewTicket { title: "Ship".to_owned(), description: "v1".to_owned() },
            now,
        );

        let reopened = ActivityTracker::open(store, TrackerSettings::default());
        assert_eq!(reopened.snapshot(), tracker.snapshot());
    }

    #[test]
    fn unreadable_database_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.json");
        std::fs::write(&path, "garbage").expect("write");

        let tracker =
            ActivityTracker::open(Arc::new(JsonFileStore::new(&path)), TrackerSettings::default());
        assert_eq!(tracker.summary().users, 0);
    }
}
