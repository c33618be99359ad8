mod bootstrap;
mod health;
mod reminders;

use std::future::Future;

use anyhow::Result;
use tally_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

use crate::bootstrap::Application;
use crate::reminders::ReminderTask;

fn init_logging(config: &AppConfig) {
    use tally_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_max_level(log_level)
                .compact()
                .init();
        }
        Pretty => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_max_level(log_level)
                .pretty()
                .init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Config errors are fatal before anything else starts.
    let config = bootstrap::load_config(LoadOptions {
        config_path: std::env::var_os("TALLY_CONFIG").map(std::path::PathBuf::from),
        require_file: true,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    serve(bootstrap::bootstrap_with_config(config), wait_for_shutdown()).await
}

/// Runs the chat runner and the reminder task until `shutdown` resolves, then
/// stops the reminder task and saves the database one last time.
async fn serve<F>(app: Application, shutdown: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    if app.config.server.enabled {
        health::spawn(
            &app.config.server.bind_address,
            app.config.server.health_check_port,
            app.tracker.clone(),
            app.config.storage.database_path.display().to_string(),
        )
        .await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reminder_task = ReminderTask {
        tracker: app.tracker.clone(),
        gateway: app.gateway.clone(),
        schedule: app.config.reminder_schedule(),
        channel_id: app.config.reminder_channel().map(str::to_owned),
    };
    let reminder_handle = tokio::spawn(reminder_task.run(shutdown_rx));

    tracing::info!(
        event_name = "system.server.chat_transport_mode",
        transport_mode = if app.runner.is_noop_transport() { "noop" } else { "gateway" },
        correlation_id = "bootstrap",
        "chat runner transport mode initialized"
    );
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        tracked_channels = app.bot.channels.tracked().len(),
        "tally-server started"
    );

    tokio::pin!(shutdown);
    let signalled = tokio::select! {
        _ = app.runner.start() => None,
        result = &mut shutdown => Some(result),
    };
    let shutdown_result = match signalled {
        Some(result) => result,
        None => {
            tracing::info!(
                event_name = "system.server.runner_finished",
                correlation_id = "bootstrap",
                "chat runner finished; waiting for shutdown signal"
            );
            shutdown.await
        }
    };
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "tally-server stopping"
    );

    // A receiver that already stopped is fine; the join below reports panics.
    let _ = shutdown_tx.send(true);
    if let Err(error) = reminder_handle.await {
        tracing::error!(
            event_name = "system.server.reminder_task_failed",
            correlation_id = "shutdown",
            error = %error,
            "reminder task did not stop cleanly"
        );
    }

    if let Err(error) = app.tracker.save() {
        tracing::error!(
            event_name = "system.server.final_save_failed",
            correlation_id = "shutdown",
            error = %error,
            "final database save failed"
        );
    }

    shutdown_result
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
