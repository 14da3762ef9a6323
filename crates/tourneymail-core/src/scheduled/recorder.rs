//! Audit Recorder - Campaign history and final item status

use std::sync::Arc;
use tourneymail_common::types::{ScheduledCampaignId, SCHEDULED_ATTRIBUTION};
use tourneymail_common::Result;
use tourneymail_storage::{
    CampaignRecord, CampaignRecordRepository, CampaignRecordStatus, NewCampaignRecord,
    ScheduledCampaignRepository,
};
use tracing::{error, info, warn};

use super::request::CampaignRequest;
use super::throttler::DeliveryReport;

/// Writes campaign records and moves scheduled items to their final status
pub struct AuditRecorder {
    scheduled: Arc<dyn ScheduledCampaignRepository>,
    records: Arc<dyn CampaignRecordRepository>,
}

impl AuditRecorder {
    pub fn new(
        scheduled: Arc<dyn ScheduledCampaignRepository>,
        records: Arc<dyn CampaignRecordRepository>,
    ) -> Self {
        Self { scheduled, records }
    }

    fn new_record(
        request: &CampaignRequest,
        recipients: usize,
        report: &DeliveryReport,
        sent_by: &str,
    ) -> NewCampaignRecord {
        NewCampaignRecord {
            subject: request.subject.clone(),
            body: request.body.clone(),
            campaign_kind: request.kind,
            mode: request.mode.clone(),
            category: request.category.clone(),
            tournament_id: request.tournament_id,
            recipients_count: clamp(recipients as u64),
            sent_count: clamp(report.sent as u64),
            failed_count: clamp(report.failed as u64),
            status: CampaignRecordStatus::Completed,
            test_mode: request.test_mode,
            sent_by: sent_by.to_string(),
            scheduled_campaign_id: request.scheduled_campaign_id,
        }
    }

    /// Complete a scheduled item and write its record in one step
    pub async fn finalize(
        &self,
        id: ScheduledCampaignId,
        request: &CampaignRequest,
        recipients: usize,
        report: &DeliveryReport,
    ) -> Result<CampaignRecord> {
        let record = Self::new_record(request, recipients, report, SCHEDULED_ATTRIBUTION);
        let created = self.scheduled.complete(id, record).await?;

        info!(
            "Scheduled campaign {} completed: {}/{} sent, {} failed (record {})",
            id, created.sent_count, created.recipients_count, created.failed_count, created.id
        );
        Ok(created)
    }

    /// Record a campaign sent on demand by an operator
    pub async fn record_manual(
        &self,
        request: &CampaignRequest,
        recipients: usize,
        report: &DeliveryReport,
        operator: &str,
    ) -> Result<CampaignRecord> {
        let record = Self::new_record(request, recipients, report, operator);
        let created = self.records.create(record).await?;

        info!(
            "Campaign {} sent by {}: {}/{} sent, {} failed",
            created.id, operator, created.sent_count, created.recipients_count, created.failed_count
        );
        Ok(created)
    }

    /// pending -> blocked
    pub async fn block(&self, id: ScheduledCampaignId, reason: &str) -> Result<bool> {
        let moved = self.scheduled.mark_blocked(id, reason).await?;
        if moved {
            info!("Scheduled campaign {} blocked: {}", id, reason);
        } else {
            warn!("Scheduled campaign {} was no longer pending when blocking", id);
        }
        Ok(moved)
    }

    /// pending -> failed
    pub async fn fail(&self, id: ScheduledCampaignId, reason: &str) -> Result<bool> {
        let moved = self.scheduled.mark_failed(id, reason).await?;
        if moved {
            error!("Scheduled campaign {} failed: {}", id, reason);
        } else {
            warn!("Scheduled campaign {} was no longer pending when failing", id);
        }
        Ok(moved)
    }
}

fn clamp(n: u64) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
