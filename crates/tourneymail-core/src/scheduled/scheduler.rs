//! Campaign Scheduler - Polls the queue and processes due campaigns

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;
use tourneymail_common::types::{CampaignRecordId, ScheduledCampaignId};
use tourneymail_common::Result;
use tourneymail_storage::{ScheduledCampaign, ScheduledCampaignRepository};
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::pipeline::DeliveryPipeline;
use super::request::CampaignRequest;

/// Overall result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    Ok,
    /// Another tick was still running; nothing was done
    Busy,
    /// The transport check failed; due items stay pending
    TransportUnavailable,
}

/// What happened to one due item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Completed {
        record_id: CampaignRecordId,
        recipients: usize,
        sent: u32,
        failed: u32,
        skipped: u32,
    },
    Blocked {
        reason: String,
    },
    Failed {
        reason: String,
    },
    /// Claimed elsewhere, or no longer pending
    NotClaimed,
    /// Infrastructure error; the item stays pending until its lease expires
    Deferred {
        reason: String,
    },
}

impl ItemOutcome {
    /// The item reached a terminal status during this tick
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemOutcome::Completed { .. } | ItemOutcome::Blocked { .. } | ItemOutcome::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub id: ScheduledCampaignId,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Structured result of a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub status: TickStatus,
    pub pending: usize,
    pub due: usize,
    pub processed: usize,
    pub items: Vec<ItemReport>,
}

impl TickReport {
    fn empty(status: TickStatus) -> Self {
        Self {
            status,
            pending: 0,
            due: 0,
            processed: 0,
            items: Vec::new(),
        }
    }
}

/// Campaign Scheduler
pub struct CampaignScheduler {
    scheduled: Arc<dyn ScheduledCampaignRepository>,
    pipeline: Arc<DeliveryPipeline>,
    clock: Arc<dyn Clock>,
    /// Interval between ticks
    poll_interval: Duration,
    /// How long a claim keeps other ticks away
    lease: chrono::Duration,
    tick_lock: Mutex<()>,
}

impl CampaignScheduler {
    pub fn new(
        scheduled: Arc<dyn ScheduledCampaignRepository>,
        pipeline: Arc<DeliveryPipeline>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheduled,
            pipeline,
            clock,
            poll_interval: Duration::from_secs(60),
            lease: chrono::Duration::hours(2),
            tick_lock: Mutex::new(()),
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval = Duration::from_secs(secs.max(1));
        self
    }

    /// Set claim lease
    pub fn with_lease(mut self, secs: u64) -> Self {
        // Capped at one year
        self.lease = chrono::Duration::seconds(secs.min(365 * 24 * 3600) as i64);
        self
    }

    pub fn lease(&self) -> chrono::Duration {
        self.lease
    }

    /// Run the scheduler loop
    pub async fn run(&self) {
        let mut ticker = interval(self.poll_interval);

        info!(
            "Campaign scheduler started (interval: {}s, lease: {}s)",
            self.poll_interval.as_secs(),
            self.lease.num_seconds()
        );

        loop {
            ticker.tick().await;

            match self.tick().await {
                Ok(report) if report.due > 0 => info!(
                    "Tick {:?}: {} due, {} processed",
                    report.status, report.due, report.processed
                ),
                Ok(report) => debug!("Tick {:?}: nothing due", report.status),
                Err(e) => error!("Error processing scheduled campaigns: {}", e),
            }
        }
    }

    /// Process every due item once.
    ///
    /// Returns immediately with `busy` when a previous tick is still running.
    pub async fn tick(&self) -> Result<TickReport> {
        let Ok(_running) = self.tick_lock.try_lock() else {
            debug!("Previous tick still running, skipping");
            return Ok(TickReport::empty(TickStatus::Busy));
        };

        if let Err(e) = self.pipeline.check_transport().await {
            warn!("Skipping tick: {}", e);
            return Ok(TickReport::empty(TickStatus::TransportUnavailable));
        }

        let pending = self.scheduled.list_pending().await?;
        let now = self.clock.now_local();
        let due: Vec<ScheduledCampaign> = pending
            .iter()
            .filter(|item| item.is_due(now))
            .cloned()
            .collect();

        let mut report = TickReport {
            status: TickStatus::Ok,
            pending: pending.len(),
            due: due.len(),
            processed: 0,
            items: Vec::with_capacity(due.len()),
        };

        for item in due {
            let outcome = self.process(&item).await;
            if outcome.is_terminal() {
                report.processed += 1;
            }
            report.items.push(ItemReport {
                id: item.id,
                outcome,
            });
        }

        Ok(report)
    }

    /// Claim, check, resolve, send and finalize one item
    async fn process(&self, item: &ScheduledCampaign) -> ItemOutcome {
        match self.scheduled.claim(item.id, self.lease).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Scheduled campaign {} already claimed", item.id);
                return ItemOutcome::NotClaimed;
            }
            Err(e) => return self.defer(item, e.to_string()),
        }

        let recorder = self.pipeline.recorder();

        let mut request = match CampaignRequest::from_item(item) {
            Ok(request) => request,
            Err(e) => return self.fail(item, e.to_string()).await,
        };
        match self.pipeline.tag_audience(&mut request).await {
            Ok(()) => {}
            Err(e) if e.fails_item() => return self.fail(item, e.to_string()).await,
            Err(e) => return self.defer(item, e.to_string()),
        }

        match self.pipeline.guard().find_conflict(&request).await {
            Ok(None) => {}
            Ok(Some(record)) => {
                let reason = format!(
                    "already delivered by {} on {} (record {})",
                    record.sent_by,
                    record.created_at.format("%d/%m/%Y %H:%M"),
                    record.id
                );
                return match recorder.block(item.id, &reason).await {
                    Ok(true) => ItemOutcome::Blocked { reason },
                    Ok(false) => ItemOutcome::NotClaimed,
                    Err(e) => self.defer(item, e.to_string()),
                };
            }
            Err(e) => return self.defer(item, e.to_string()),
        }

        let messages = match self.pipeline.prepare(&request).await {
            Ok(messages) => messages,
            Err(e) if e.fails_item() => return self.fail(item, e.to_string()).await,
            Err(e) => return self.defer(item, e.to_string()),
        };

        info!(
            item_id = %item.id,
            kind = %request.kind,
            "Sending scheduled campaign to {} recipient(s)",
            messages.len()
        );
        let delivery = self.pipeline.throttler().deliver(&request, &messages).await;

        match recorder
            .finalize(item.id, &request, messages.len(), &delivery)
            .await
        {
            Ok(record) => {
                info!(
                    item_id = %item.id,
                    sent = delivery.sent,
                    failed = delivery.failed,
                    "Scheduled campaign completed"
                );
                ItemOutcome::Completed {
                    record_id: record.id,
                    recipients: messages.len(),
                    sent: delivery.sent,
                    failed: delivery.failed,
                    skipped: delivery.skipped,
                }
            }
            Err(e) => {
                error!(
                    "Scheduled campaign {} was sent but could not be finalized: {}",
                    item.id, e
                );
                ItemOutcome::Deferred {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn fail(&self, item: &ScheduledCampaign, reason: String) -> ItemOutcome {
        match self.pipeline.recorder().fail(item.id, &reason).await {
            Ok(true) => ItemOutcome::Failed { reason },
            Ok(false) => ItemOutcome::NotClaimed,
            Err(e) => self.defer(item, e.to_string()),
        }
    }

    fn defer(&self, item: &ScheduledCampaign, reason: String) -> ItemOutcome {
        error!("Scheduled campaign {} deferred: {}", item.id, reason);
        ItemOutcome::Deferred { reason }
    }
}
