//! Scheduled Jobs
//!
//! Background safety net for the outbox: a fixed-period sweep that resends
//! entries whose delivery failed.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::domain::{OutboxEntry, OutboxStatus};
use crate::outbox::{EventPublisher, OutboxError};

// =========================================================================
// Outbox Retry Sweep
// =========================================================================

/// Configuration for the outbox retry sweep
#[derive(Debug, Clone)]
pub struct OutboxSweepConfig {
    /// Time between sweeps (default: 30 seconds)
    pub interval: Duration,
    /// Maximum entries loaded per status per sweep (default: 100)
    pub batch_size: i64,
    /// PENDING entries never attempted and older than this are resent too
    /// (default: 60 seconds)
    pub stale_pending_after: Duration,
    /// Attempts after which every further failure is logged as a warning
    /// (default: 10). Entries are retried regardless.
    pub attempt_warning_threshold: i32,
}

impl Default for OutboxSweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 100,
            stale_pending_after: Duration::from_secs(60),
            attempt_warning_threshold: 10,
        }
    }
}

/// Periodic resend of FAILED outbox entries.
///
/// Meant to run as a single instance. A second instance would only cause
/// duplicate sends, which consumers already tolerate.
pub struct OutboxRetryScheduler {
    publisher: EventPublisher,
    config: OutboxSweepConfig,
}

impl OutboxRetryScheduler {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            publisher,
            config: OutboxSweepConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(publisher: EventPublisher, config: OutboxSweepConfig) -> Self {
        Self { publisher, config }
    }

    /// Start the sweep loop in the background. It stops when `shutdown`
    /// turns true or its sender is dropped.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Outbox retry scheduler started"
        );

        let mut ticker = interval(self.config.interval);
        // A sweep that overruns the period delays the next one instead of
        // stacking up ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.attempted > 0 => {
                            tracing::info!(
                                attempted = report.attempted,
                                sent = report.sent,
                                failed = report.failed,
                                "Outbox sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Outbox sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Outbox retry scheduler stopped");
    }

    /// Run one sweep (also used for manual trigger and testing)
    pub async fn sweep_once(&self) -> Result<SweepReport, JobError> {
        let outbox = self.publisher.outbox();
        let mut entries = outbox
            .list_by_status(OutboxStatus::Failed, self.config.batch_size)
            .await?;

        let stale_before = Utc::now()
            - chrono::Duration::from_std(self.config.stale_pending_after)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let stale = outbox
            .list_stale_pending(stale_before, self.config.batch_size)
            .await?;
        if !stale.is_empty() {
            tracing::warn!(count = stale.len(), "Resending outbox entries stuck in PENDING");
        }
        entries.extend(stale);

        let mut report = SweepReport::default();
        for entry in entries {
            self.resend(&entry, &mut report).await;
        }

        report.completed_at = Utc::now();
        Ok(report)
    }

    /// One entry's failure never stops the rest of the sweep
    async fn resend(&self, entry: &OutboxEntry, report: &mut SweepReport) {
        report.attempted += 1;
        match self.publisher.deliver(entry).await {
            Ok(OutboxStatus::Sent) => report.sent += 1,
            Ok(_) => {
                report.failed += 1;
                if entry.attempts + 1 >= self.config.attempt_warning_threshold {
                    tracing::warn!(
                        outbox_id = %entry.id,
                        topic = %entry.topic,
                        attempts = entry.attempts + 1,
                        "Outbox entry keeps failing"
                    );
                }
            }
            Err(e) => {
                report.failed += 1;
                report.errors.push(format!("{}: {}", entry.id, e));
            }
        }
    }
}

/// Report from one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub attempted: u64,
    pub sent: u64,
    pub failed: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_config_default() {
        let config = OutboxSweepConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.stale_pending_after, Duration::from_secs(60));
    }

    #[test]
    fn test_sweep_report_default() {
        let report = SweepReport::default();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.errors.len(), 0);
    }
}
