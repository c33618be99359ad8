use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tally_core::tracker::ActivityTracker;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    tracker: Arc<ActivityTracker>,
    database_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub users: usize,
    pub activities: usize,
    pub tickets: usize,
    pub database_path: String,
    pub checked_at: String,
}

pub fn router(tracker: Arc<ActivityTracker>, database_path: String) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { tracker, database_path })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    tracker: Arc<ActivityTracker>,
    database_path: String,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(tracker, database_path)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let summary = state.tracker.summary();
    let payload = HealthResponse {
        status: "ready",
        users: summary.users,
        activities: summary.activities,
        tickets: summary.tickets,
        database_path: state.database_path.clone(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use tally_core::domain::{ChannelId, UserId};
    use tally_core::store::MemoryStore;
    use tally_core::tracker::{ActivityTracker, NewTicket, TrackerSettings};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_tracker_counts() {
        let tracker = Arc::new(ActivityTracker::new(
            Arc::new(MemoryStore::default()),
            TrackerSettings::default(),
        ));
        tracker.create_ticket(
            &UserId::from("U1"),
            &ChannelId::from("C1"),
            "atlas",
            NewTicket { title: "Ship".to_owned(), description: String::new() },
        );

        let (status, Json(payload)) = health(State(HealthState {
            tracker,
            database_path: "data.json".to_owned(),
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!((payload.users, payload.activities, payload.tickets), (1, 1, 1));
        assert_eq!(payload.database_path, "data.json");
    }
}
