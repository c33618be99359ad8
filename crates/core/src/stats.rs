use chrono::{DateTime, Duration, Utc};

use crate::domain::{ActivityRecord, ChannelId};

pub const PROGRESS_BAR_SEGMENTS: usize = 10;
const FILLED_SEGMENT: char = '█';
const EMPTY_SEGMENT: char = '░';

/// `completed / total` as a percentage; an empty total counts as 0%.
pub fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}

/// Whole segments covered by `percentage`, truncated and clamped to the bar.
pub fn filled_segments(percentage: f64) -> usize {
    let raw = (percentage / 100.0) * PROGRESS_BAR_SEGMENTS as f64;
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    (raw as usize).min(PROGRESS_BAR_SEGMENTS)
}

pub fn progress_bar(percentage: f64) -> String {
    let filled = filled_segments(percentage);
    let mut bar = String::with_capacity(PROGRESS_BAR_SEGMENTS * 3 + 2);
    bar.push('[');
    bar.extend(std::iter::repeat(FILLED_SEGMENT).take(filled));
    bar.extend(std::iter::repeat(EMPTY_SEGMENT).take(PROGRESS_BAR_SEGMENTS - filled));
    bar.push(']');
    bar
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectStats {
    pub channel_id: ChannelId,
    pub project_name: String,
    pub completed_tickets: usize,
    pub total_tickets: usize,
    pub percentage: f64,
    pub last_check_in: DateTime<Utc>,
    pub days_since_check_in: i64,
    pub check_ins_last_week: usize,
}

impl ProjectStats {
    pub fn from_record(
        channel_id: &ChannelId,
        record: &ActivityRecord,
        now: DateTime<Utc>,
    ) -> Self {
        let completed_tickets = record.completed_tickets();
        let total_tickets = record.total_tickets();

        Self {
            channel_id: channel_id.clone(),
            project_name: record.project_name.clone(),
            completed_tickets,
            total_tickets,
            percentage: percentage(completed_tickets, total_tickets),
            last_check_in: record.last_check_in,
            days_since_check_in: now.signed_duration_since(record.last_check_in).num_days(),
            check_ins_last_week: record.check_ins_after(now - Duration::days(7)),
        }
    }

    pub fn has_tickets(&self) -> bool {
        self.total_tickets > 0
    }

    pub fn progress_bar(&self) -> String {
        progress_bar(self.percentage)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{filled_segments, percentage, progress_bar, ProjectStats};
    use crate::domain::{ActivityRecord, ChannelId, Ticket, TicketId};

    #[test]
    fn percentage_handles_empty_totals() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 4), 75.0);
        assert_eq!(percentage(4, 4), 100.0);
    }

    #[test]
    fn progress_bar_truncates_partial_segments() {
        assert_eq!(progress_bar(0.0), "[░░░░░░░░░░]");
        assert_eq!(progress_bar(100.0), "[██████████]");
        assert_eq!(progress_bar(55.0), "[█████░░░░░]");
        assert_eq!(filled_segments(55.0), 5);
        assert_eq!(filled_segments(99.9), 9);
    }

    #[test]
    fn progress_bar_clamps_out_of_range_input() {
        assert_eq!(filled_segments(-10.0), 0);
        assert_eq!(filled_segments(250.0), 10);
        assert_eq!(filled_segments(f64::NAN), 0);
    }

    #[test]
    fn stats_count_recent_check_ins_and_tickets() {
        let now = Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap();
        let mut record = ActivityRecord::new("atlas", now - Duration::days(30));
        for days_ago in [10, 6, 3] {
            record.record_check_in(now - Duration::days(days_ago), None);
        }
        for position in 1..=4 {
            let id = TicketId::for_position(position);
            let mut ticket = Ticket::open(id.clone(), "t", "", "atlas", now);
            if position <= 3 {
                ticket.complete(now);
            }
            record.tickets.insert(id, ticket);
        }

        let stats = ProjectStats::from_record(&ChannelId::from("C1"), &record, now);

        assert_eq!(stats.completed_tickets, 3);
        assert_eq!(stats.total_tickets, 4);
        assert_eq!(stats.percentage, 75.0);
        assert_eq!(stats.days_since_check_in, 3);
        assert_eq!(stats.check_ins_last_week, 2);
        assert_eq!(stats.progress_bar(), "[███████░░░]");
    }
}
