//! Background cancellation of reservations whose hold has run out.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use domain::Order;
use order_store::{OrderRepository, OrderRepositoryExt, StoreError};
use publisher::{CancelReason, EventDispatcher, OrderCancelled};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Timing of the expiration sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Deadline for the scan of one sweep.
    pub scan_timeout: Duration,
    /// Deadline for each cancellation write.
    pub update_timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            scan_timeout: Duration::from_secs(30),
            update_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Orders returned by the scan.
    pub scanned: usize,
    /// Orders moved to Cancelled.
    pub cancelled: usize,
    /// Orders that no longer qualified for cancellation.
    pub skipped: usize,
    /// Orders changed by someone else between scan and write.
    pub conflicts: usize,
    /// Orders whose write failed for any other reason.
    pub failed: usize,
}

/// Periodically cancels reserved orders past their deadline.
///
/// Each sweep scans one batch of lapsed reservations and cancels them one by
/// one with a version-checked write. A failure on one order never stops the
/// rest of the batch; orders left behind are picked up by a later sweep.
pub struct ExpirationSweeper<R> {
    repo: R,
    dispatcher: EventDispatcher,
    config: SweeperConfig,
}

impl<R: OrderRepository> ExpirationSweeper<R> {
    pub fn new(repo: R, dispatcher: EventDispatcher, config: SweeperConfig) -> Self {
        Self {
            repo,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> SweeperConfig {
        self.config
    }

    /// Runs sweeps until `shutdown` turns true or its sender is dropped.
    ///
    /// The first sweep starts immediately. Sweeps that would overlap a slow
    /// predecessor are skipped rather than queued.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval = ?self.config.interval, "expiration sweeper started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("expiration sweeper stopped");
    }

    async fn tick(&self) {
        let started = Instant::now();
        match self.sweep_once(Utc::now()).await {
            Ok(report) if report.scanned > 0 => {
                tracing::info!(
                    scanned = report.scanned,
                    cancelled = report.cancelled,
                    skipped = report.skipped,
                    conflicts = report.conflicts,
                    failed = report.failed,
                    "sweep finished"
                );
            }
            Ok(_) => tracing::debug!("sweep found no expired reservations"),
            Err(e) => {
                metrics::counter!("sweeper_scan_failures_total").increment(1);
                tracing::error!(error = %e, "expiration scan failed");
            }
        }
        metrics::histogram!("sweeper_tick_duration_seconds").record(started.elapsed().as_secs_f64());
    }

    /// Cancels every reservation the scan reports as lapsed at `now`.
    ///
    /// Fails only if the scan itself fails.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let expired = self
            .repo
            .scan_expired_within(now, self.config.scan_timeout)
            .await?;

        let mut report = SweepReport {
            scanned: expired.len(),
            ..SweepReport::default()
        };

        for order in expired {
            self.expire(order, now, &mut report).await;
        }

        Ok(report)
    }

    #[tracing::instrument(skip(self, order, now, report), fields(order_id = %order.id(), version = %order.version()))]
    async fn expire(&self, mut order: Order, now: DateTime<Utc>, report: &mut SweepReport) {
        if !order.is_reservation_expired(now) {
            report.skipped += 1;
            return;
        }
        if let Err(e) = order.cancel() {
            tracing::warn!(error = %e, "expired order can no longer be cancelled");
            report.skipped += 1;
            return;
        }

        match self
            .repo
            .conditional_update_within(&order, self.config.update_timeout)
            .await
        {
            Ok(_) => {
                report.cancelled += 1;
                metrics::counter!("sweeper_orders_cancelled_total").increment(1);
                tracing::info!("reservation expired, order cancelled");

                self.dispatcher.dispatch(&OrderCancelled {
                    order_id: order.id(),
                    reason: CancelReason::DownpaymentTimeout,
                });
            }
            Err(StoreError::OptimisticLockConflict { actual, .. }) => {
                report.conflicts += 1;
                metrics::counter!("order_update_conflicts_total", "source" => "sweeper")
                    .increment(1);
                tracing::info!(%actual, "order changed since the scan, leaving it");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(error = %e, "failed to cancel expired order");
            }
        }
    }
}
