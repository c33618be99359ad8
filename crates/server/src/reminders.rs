//! Daily reminder task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use tally_chat::messages;
use tally_chat::ChatGateway;
use tally_core::reminder::ReminderSchedule;
use tally_core::tracker::ActivityTracker;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Longest single sleep; wall-clock jumps are picked up on the next wake.
const MAX_SLEEP: Duration = Duration::from_secs(60 * 60);

pub struct ReminderTask {
    pub tracker: Arc<ActivityTracker>,
    pub gateway: Arc<dyn ChatGateway>,
    pub schedule: ReminderSchedule,
    pub channel_id: Option<String>,
}

impl ReminderTask {
    /// Sleeps until the next configured fire time, sends due reminders and
    /// repeats until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            event_name = "reminder.scheduler.started",
            reminder_time = %self.schedule.time,
            frequency_hours = self.schedule.frequency.num_hours(),
            "reminder scheduler started"
        );
        let mut last_fired: Option<NaiveDate> = None;

        loop {
            let wait = self.tick(&Local::now(), &mut last_fired).await;

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(
                            event_name = "reminder.scheduler.stopped",
                            "reminder scheduler stopped"
                        );
                        return;
                    }
                }
            }
        }
    }

    /// One scheduler pass at `now`. Sends reminders when a fire is due and not
    /// yet done today, then returns how long to sleep before the next pass.
    pub async fn tick<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        last_fired: &mut Option<NaiveDate>,
    ) -> Duration {
        let local = now.naive_local();
        let mut next = self.schedule.next_fire_after(local, *last_fired);

        if next <= local {
            let sent = self.send_due(now).await;
            *last_fired = Some(local.date());
            debug!(event_name = "reminder.scheduler.fired", sent, "reminder pass finished");
            next = self.schedule.next_fire_after(local, *last_fired);
        }

        let wait = (next - local).to_std().unwrap_or(MAX_SLEEP).min(MAX_SLEEP);
        debug!(
            event_name = "reminder.scheduler.sleeping",
            next_fire = %next,
            wait_secs = wait.as_secs(),
            "waiting for next reminder window"
        );
        wait
    }

    /// Sends one message per overdue record at `now`. Returns how many were sent.
    pub async fn send_due<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> usize {
        let Some(channel_id) = self.channel_id.as_deref() else {
            debug!(event_name = "reminder.skipped", "no reminder channel configured");
            return 0;
        };

        let due = self.schedule.due(&self.tracker, now);
        let mut sent = 0;
        for reminder in &due {
            let content = messages::reminder(reminder);
            match self.gateway.send_message(channel_id, &content).await {
                Ok(()) => {
                    sent += 1;
                    info!(
                        event_name = "reminder.sent",
                        user_id = %reminder.user_id,
                        project_name = %reminder.project_name,
                        hours_since_check_in = reminder.hours_since_check_in,
                        "reminder sent"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "reminder.send_failed",
                        user_id = %reminder.user_id,
                        error = %error,
                        "could not send reminder"
                    );
                }
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use tally_chat::{Outbound, RecordingGateway};
    use tally_core::domain::{ChannelId, UserId};
    use tally_core::reminder::{ReminderSchedule, ReminderTime};
    use tally_core::store::MemoryStore;
    use tally_core::tracker::{ActivityTracker, CheckInRequest, TrackerSettings};
    use tokio::sync::watch;

    use super::ReminderTask;

    fn tracker_with_check_in(hours_ago: i64, now: chrono::DateTime<Utc>) -> Arc<ActivityTracker> {
        let tracker = Arc::new(ActivityTracker::new(
            Arc::new(MemoryStore::default()),
            TrackerSettings::default(),
        ));
        tracker.record_check_in_at(
            &CheckInRequest {
                user_id: UserId::from("U1"),
                channel_id: ChannelId::from("C1"),
                project_name: "atlas".to_owned(),
                display_name: None,
            },
            now - Duration::hours(hours_ago),
        );
        tracker
    }

    fn task(
        tracker: Arc<ActivityTracker>,
        gateway: Arc<RecordingGateway>,
        channel_id: Option<&str>,
    ) -> ReminderTask {
        ReminderTask {
            tracker,
            gateway,
            schedule: ReminderSchedule::new(ReminderTime::default(), 24),
            channel_id: channel_id.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn overdue_user_gets_one_reminder_in_the_window() {
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 9, 1, 0).unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        let task = task(tracker_with_check_in(30, now), gateway.clone(), Some("R1"));

        assert_eq!(task.send_due(&now).await, 1);
        assert_eq!(
            gateway.sent().await,
            vec![Outbound::SendMessage {
                channel_id: "R1".to_owned(),
                content: "<@U1>, you haven't checked in on project **atlas** for 30 hours. \
                          Remember to update your progress!"
                    .to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn nothing_is_sent_outside_the_window_or_without_a_channel() {
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 9, 1, 0).unwrap();
        let gateway = Arc::new(RecordingGateway::default());

        let without_channel = task(tracker_with_check_in(30, now), gateway.clone(), None);
        assert_eq!(without_channel.send_due(&now).await, 0);

        let later = now + Duration::hours(3);
        let outside = task(tracker_with_check_in(30, now), gateway.clone(), Some("R1"));
        assert_eq!(outside.send_due(&later).await, 0);

        let recent = task(tracker_with_check_in(2, now), gateway.clone(), Some("R1"));
        assert_eq!(recent.send_due(&now).await, 0);

        assert!(gateway.sent().await.is_empty());
    }

    #[tokio::test]
    async fn send_failures_are_not_counted() {
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 9, 1, 0).unwrap();
        let task = task(
            tracker_with_check_in(30, now),
            Arc::new(RecordingGateway::failing_sends()),
            Some("R1"),
        );

        assert_eq!(task.send_due(&now).await, 0);
    }

    #[tokio::test]
    async fn tick_fires_once_per_day() {
        let morning = Utc.with_ymd_and_hms(2026, 4, 2, 9, 1, 0).unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        let task = task(tracker_with_check_in(30, morning), gateway.clone(), Some("R1"));
        let mut last_fired = None;

        let wait = task.tick(&morning, &mut last_fired).await;
        assert_eq!(last_fired, Some(morning.date_naive()));
        assert_eq!(wait, std::time::Duration::from_secs(60 * 60));
        assert_eq!(gateway.sent().await.len(), 1);

        let same_window = morning + Duration::minutes(2);
        task.tick(&same_window, &mut last_fired).await;
        assert_eq!(gateway.sent().await.len(), 1, "second pass in the window must not resend");

        let next_day = morning + Duration::days(1);
        task.tick(&next_day, &mut last_fired).await;
        assert_eq!(last_fired, Some(next_day.date_naive()));
        assert_eq!(gateway.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn tick_before_the_window_sleeps_until_it() {
        let early = Utc.with_ymd_and_hms(2026, 4, 2, 8, 30, 0).unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        let task = task(tracker_with_check_in(30, early), gateway.clone(), Some("R1"));
        let mut last_fired = None;

        let wait = task.tick(&early, &mut last_fired).await;

        assert_eq!(wait, std::time::Duration::from_secs(30 * 60));
        assert_eq!(last_fired, None);
        assert!(gateway.sent().await.is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let now = Utc::now();
        let task = task(
            tracker_with_check_in(1, now),
            Arc::new(RecordingGateway::default()),
            Some("R1"),
        );
        let (sender, receiver) = watch::channel(false);

        let handle = tokio::spawn(task.run(receiver));
        sender.send(true).expect("receiver alive");

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("task stops promptly")
            .expect("task does not panic");
    }
}
