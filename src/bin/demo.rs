//! Scripted demo session for the frame scheduler.
//!
//! Drives a scheduler from the tokio tick driver, registers one task of
//! every kind, and exits once the closing delay fires. Set `RUST_LOG=debug`
//! to watch promotion and sweep activity.

use frame_scheduler::{Repeat, Scheduler, SchedulerConfig, TickDriver, TimeSource};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var_os("FRAME_SCHEDULER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(SchedulerConfig::default_config_path);
    let config = SchedulerConfig::load_or_default(&config_path)?;
    info!(path = %config_path.display(), ?config, "configuration loaded");

    let mut scheduler = Scheduler::with_config(config)?;
    let shutdown = CancellationToken::new();

    scheduler.next_tick(|ctx| {
        info!(task = %ctx.id(), "first tick");
        Ok(())
    })?;

    let mut beat = 0_u32;
    scheduler.interval_with(
        Duration::from_millis(250),
        Repeat::Times(4),
        TimeSource::Scaled,
        move |ctx| {
            beat += 1;
            info!(task = %ctx.id(), beat, "heartbeat");
            Ok(())
        },
    )?;

    let work = tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(400)).await;
        42_u32
    });
    let work_id = scheduler.schedule_async(work, &shutdown)?;
    info!(task = %work_id, "background work observed");

    scheduler.delay(Duration::from_millis(600), |ctx| {
        info!(task = %ctx.id(), "registering a follow-up from inside a callback");
        ctx.next_tick(|ctx| {
            info!(task = %ctx.id(), "follow-up ran on the next tick");
            Ok(())
        })?;
        Ok(())
    })?;

    let stop = shutdown.clone();
    scheduler.delay_with(Duration::from_millis(1500), TimeSource::Unscaled, move |_| {
        info!("demo finished; stopping driver");
        stop.cancel();
        Ok(())
    })?;

    let scheduler = TickDriver::from_scheduler(scheduler)?
        .with_shutdown(shutdown)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("tick driver failed: {e}"))?;

    let snapshot = scheduler.snapshot();
    info!(
        ticks = snapshot.tick,
        remaining = snapshot.tasks.len(),
        "scheduler shut down cleanly"
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
