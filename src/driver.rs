//! Tokio-based tick loop for hosts without a frame loop of their own.
//!
//! [`TickDriver`] owns a [`Scheduler`] on a tokio task and calls
//! [`Scheduler::advance`] at a fixed rate, scaling real elapsed time by the
//! configured time scale. The scheduler is handed back when the driver
//! shuts down.

use crate::config::DriverConfig;
use crate::error::Result;
use crate::scheduler::Scheduler;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Host hook invoked before every `advance`.
pub type TickHook = Box<dyn FnMut(&mut Scheduler) + Send>;

/// Drives a [`Scheduler`] from a tokio interval.
pub struct TickDriver {
    scheduler: Scheduler,
    config: DriverConfig,
    hook: Option<TickHook>,
    shutdown: CancellationToken,
}

impl TickDriver {
    /// Create a driver for `scheduler`.
    pub fn new(scheduler: Scheduler, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scheduler,
            config,
            hook: None,
            shutdown: CancellationToken::new(),
        })
    }

    /// Create a driver using the scheduler's own `driver` configuration.
    pub fn from_scheduler(scheduler: Scheduler) -> Result<Self> {
        let config = scheduler.config().driver.clone();
        Self::new(scheduler, config)
    }

    /// Run `hook` before every tick, e.g. to register work from host input.
    pub fn with_hook(mut self, hook: TickHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Token that stops the driver when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Mutable access to the scheduler before the driver starts.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Tick period derived from the configured rate.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.config.tick_rate_hz))
    }

    /// Start the tick loop. The join handle yields the scheduler once the
    /// shutdown token is cancelled.
    pub fn run(mut self) -> tokio::task::JoinHandle<Scheduler> {
        tokio::spawn(async move {
            let period = self.period();
            info!(
                tick_rate_hz = self.config.tick_rate_hz,
                time_scale = self.config.time_scale,
                tasks = self.scheduler.active_count(),
                "tick driver started"
            );

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();

            loop {
                tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let now = Instant::now();
                let unscaled = now.saturating_duration_since(last);
                last = now;
                let scaled = unscaled.mul_f64(self.config.time_scale);

                if let Some(hook) = self.hook.as_mut() {
                    hook(&mut self.scheduler);
                }
                self.scheduler.advance(scaled, unscaled);
            }

            debug!(
                ticks = self.scheduler.tick_count(),
                remaining = self.scheduler.active_count(),
                "tick driver stopping"
            );
            info!("tick driver stopped");
            self.scheduler
        })
    }
}

impl std::fmt::Debug for TickDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriver")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}
