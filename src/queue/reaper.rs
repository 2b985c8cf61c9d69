//! Reaper: returns expired claims to the pending pool.
//!
//! A worker that crashes or hangs after `receive` never calls `complete` or
//! `fail`. Once its claim is older than the visibility timeout, the reaper
//! flips the message back to `pending` so another worker can claim it.
//!
//! The sweep period, the timeout and the set of queues are all explicit
//! configuration. The loop runs on `tokio::time`, so tests can pause and
//! advance time instead of sleeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::QueueService;
use crate::config::QueueConfig;
use crate::error::Result;

/// Configuration for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// How long a claim may stay in `processing` before it expires.
    pub visibility_timeout: Duration,
    /// Queues to sweep. Empty means every queue.
    pub queues: Vec<String>,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        QueueConfig::default().into()
    }
}

impl From<QueueConfig> for ReaperConfig {
    fn from(config: QueueConfig) -> Self {
        Self {
            interval: config.reaper_interval,
            visibility_timeout: config.visibility_timeout,
            queues: config.reaper_queues,
        }
    }
}

/// Periodic sweep over stale claims.
#[derive(Clone)]
pub struct Reaper {
    service: QueueService,
    config: ReaperConfig,
    shutdown: Arc<Notify>,
}

impl Reaper {
    pub fn new(service: QueueService, config: ReaperConfig) -> Self {
        Self {
            service,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the reaper loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// One pass over the configured queues. Returns how many messages
    /// were requeued.
    pub async fn sweep(&self) -> Result<u64> {
        let timeout = self.config.visibility_timeout;
        if self.config.queues.is_empty() {
            return self.service.requeue_stale_all(timeout).await;
        }

        let mut requeued = 0;
        for queue in &self.config.queues {
            requeued += self.service.requeue_stale(queue, timeout).await?;
        }
        Ok(requeued)
    }

    /// Sweep every `interval` until [`shutdown`](Self::shutdown) is called.
    ///
    /// The first sweep happens immediately. A failed sweep is logged and
    /// the loop carries on with the next tick.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            visibility_timeout_secs = self.config.visibility_timeout.as_secs_f64(),
            queues = ?self.config.queues,
            "reaper started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("reaper shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.sweep().await {
                Ok(0) => {}
                Ok(requeued) => {
                    info!(requeued, "requeued stale messages (visibility timeout expired)");
                }
                Err(e) => error!("reaper sweep error: {e}"),
            }
        }
    }
}
