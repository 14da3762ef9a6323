//! Campaign Manager - Schedule, cancel and send campaigns on demand

use std::sync::Arc;
use thiserror::Error;
use tourneymail_common::types::ScheduledCampaignId;
use tourneymail_storage::{
    CampaignRecord, CampaignRecordRepository, NewScheduledCampaign, ScheduledCampaign,
    ScheduledCampaignRepository, ScheduledCampaignStatus,
};
use tracing::info;

use super::clock::Clock;
use super::error::DeliveryError;
use super::pipeline::DeliveryPipeline;
use super::request::{CampaignRequest, ManualCampaign};

/// Campaign manager errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Scheduled campaign not found")]
    NotFound,

    #[error("Scheduled campaign is {0}, not pending")]
    NotPending(String),

    #[error("Scheduled campaign is being delivered")]
    InProgress,

    #[error("Invalid campaign: {0}")]
    Invalid(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Storage error: {0}")]
    Storage(#[from] tourneymail_common::Error),
}

/// Campaign Manager - Operator-facing campaign operations
pub struct CampaignManager {
    scheduled: Arc<dyn ScheduledCampaignRepository>,
    records: Arc<dyn CampaignRecordRepository>,
    pipeline: Arc<DeliveryPipeline>,
    clock: Arc<dyn Clock>,
    lease: chrono::Duration,
}

impl CampaignManager {
    pub fn new(
        scheduled: Arc<dyn ScheduledCampaignRepository>,
        records: Arc<dyn CampaignRecordRepository>,
        pipeline: Arc<DeliveryPipeline>,
        clock: Arc<dyn Clock>,
        lease: chrono::Duration,
    ) -> Self {
        Self {
            scheduled,
            records,
            pipeline,
            clock,
            lease,
        }
    }

    /// Queue a campaign for a future organization-local time
    pub async fn schedule(&self, input: NewScheduledCampaign) -> Result<ScheduledCampaign, CampaignError> {
        CampaignRequest::from(&input)
            .validate()
            .map_err(CampaignError::Invalid)?;

        if input.created_by.trim().is_empty() {
            return Err(CampaignError::Invalid("created_by is required".to_string()));
        }
        if let Some(context) = &input.context {
            if !context.is_object() && !context.is_null() {
                return Err(CampaignError::Invalid("context must be an object".to_string()));
            }
        }
        if input.scheduled_at <= self.clock.now_local() {
            return Err(CampaignError::Invalid(format!(
                "scheduled time {} is in the past",
                input.scheduled_at.format("%d/%m/%Y %H:%M")
            )));
        }

        let item = self.scheduled.create(input).await?;
        info!(
            "Campaign {} ({}) scheduled for {} by {}",
            item.id, item.campaign_kind, item.scheduled_at, item.created_by
        );
        Ok(item)
    }

    /// Cancel a pending item; refused while a tick is delivering it
    pub async fn cancel(&self, id: ScheduledCampaignId) -> Result<ScheduledCampaign, CampaignError> {
        if let Some(cancelled) = self.scheduled.cancel(id, self.lease).await? {
            info!("Scheduled campaign {} cancelled", id);
            return Ok(cancelled);
        }

        let item = self.scheduled.get(id).await?.ok_or(CampaignError::NotFound)?;
        match item.status_enum() {
            Some(ScheduledCampaignStatus::Pending) => Err(CampaignError::InProgress),
            _ => Err(CampaignError::NotPending(item.status)),
        }
    }

    pub async fn get(&self, id: ScheduledCampaignId) -> Result<ScheduledCampaign, CampaignError> {
        self.scheduled.get(id).await?.ok_or(CampaignError::NotFound)
    }

    pub async fn list(
        &self,
        status: Option<ScheduledCampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ScheduledCampaign>, CampaignError> {
        Ok(self.scheduled.list(status, limit, offset).await?)
    }

    /// Campaign history, most recent first, with the total count
    pub async fn history(&self, limit: i64, offset: i64) -> Result<(Vec<CampaignRecord>, i64), CampaignError> {
        let records = self.records.list(limit, offset).await?;
        let total = self.records.count().await?;
        Ok((records, total))
    }

    /// Send a campaign immediately, attributed to `operator`.
    ///
    /// Manual sends are not checked against history; their record is what
    /// later blocks a scheduled duplicate.
    pub async fn send_now(
        &self,
        campaign: ManualCampaign,
        operator: &str,
    ) -> Result<CampaignRecord, CampaignError> {
        if operator.trim().is_empty() {
            return Err(CampaignError::Invalid("operator is required".to_string()));
        }
        let mut request = CampaignRequest::from(campaign);
        request.validate().map_err(CampaignError::Invalid)?;
        self.pipeline.tag_audience(&mut request).await?;

        self.pipeline.check_transport().await?;

        let messages = self.pipeline.prepare(&request).await?;
        info!(
            "{} sending {} campaign to {} recipient(s)",
            operator,
            request.kind,
            messages.len()
        );
        let report = self.pipeline.throttler().deliver(&request, &messages).await;

        Ok(self
            .pipeline
            .recorder()
            .record_manual(&request, messages.len(), &report, operator)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduled::test_support::*;
    use crate::scheduled::CampaignScheduler;
    use pretty_assertions::assert_eq;
    use tourneymail_common::types::CampaignKind;
    use tourneymail_storage::MemoryStore;

    fn manager(store: &MemoryStore, mailer: Arc<RecordingMailer>) -> CampaignManager {
        CampaignManager::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(pipeline(store, mailer)),
            fixed_clock(),
            chrono::Duration::hours(2),
        )
    }

    fn new_item(kind: CampaignKind) -> NewScheduledCampaign {
        NewScheduledCampaign {
            campaign_kind: kind,
            subject: "Relance".to_string(),
            body: "Bonjour {first_name}".to_string(),
            outro: None,
            image_url: None,
            scheduled_at: future(),
            mode: Some("libre".to_string()),
            category: Some("R1".to_string()),
            tournament_id: None,
            recipient_ids: Vec::new(),
            context: None,
            test_mode: false,
            test_address: None,
            cc_address: None,
            created_by: "secretariat".to_string(),
        }
    }

    fn manual(kind: CampaignKind) -> ManualCampaign {
        ManualCampaign {
            campaign_kind: kind,
            subject: "Relance".to_string(),
            body: "Bonjour {first_name}".to_string(),
            outro: None,
            image_url: None,
            mode: Some("libre".to_string()),
            category: Some("R1".to_string()),
            tournament_id: None,
            recipient_ids: Vec::new(),
            context: Default::default(),
            test_mode: false,
            test_address: None,
            cc_address: None,
        }
    }

    #[tokio::test]
    async fn test_schedule_validates_input() {
        let store = MemoryStore::new();
        let manager = manager(&store, Arc::new(RecordingMailer::new()));

        let mut missing_tags = new_item(CampaignKind::RelanceT2);
        missing_tags.category = None;
        assert!(matches!(
            manager.schedule(missing_tags).await,
            Err(CampaignError::Invalid(_))
        ));

        let mut in_past = new_item(CampaignKind::RelanceT2);
        in_past.scheduled_at = past();
        assert!(matches!(
            manager.schedule(in_past).await,
            Err(CampaignError::Invalid(_))
        ));

        let item = manager.schedule(new_item(CampaignKind::RelanceT2)).await.unwrap();
        assert_eq!(item.status_enum(), Some(ScheduledCampaignStatus::Pending));
    }

    #[tokio::test]
    async fn test_cancel_pending_then_refuse() {
        let store = MemoryStore::new();
        let manager = manager(&store, Arc::new(RecordingMailer::new()));
        let item = manager.schedule(new_item(CampaignKind::RelanceT2)).await.unwrap();

        let cancelled = manager.cancel(item.id).await.unwrap();
        assert_eq!(cancelled.status_enum(), Some(ScheduledCampaignStatus::Cancelled));

        assert!(matches!(
            manager.cancel(item.id).await,
            Err(CampaignError::NotPending(status)) if status == "cancelled"
        ));
        assert!(matches!(
            manager.cancel(uuid::Uuid::new_v4()).await,
            Err(CampaignError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_cancel_refused_while_claimed() {
        let store = MemoryStore::new();
        let manager = manager(&store, Arc::new(RecordingMailer::new()));
        let item = pending_item(CampaignKind::Custom, past());
        store.insert_scheduled(item.clone()).await;
        ScheduledCampaignRepository::claim(&store, item.id, chrono::Duration::hours(2))
            .await
            .unwrap();

        assert!(matches!(
            manager.cancel(item.id).await,
            Err(CampaignError::InProgress)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_now_records_operator_and_blocks_schedule() {
        let store = MemoryStore::new();
        store
            .insert_contact(contact("L1", "Jean", Some("jean@example.org")))
            .await;
        store.insert_ranking(ranking("L1", 1, 120)).await;

        let mailer = Arc::new(RecordingMailer::new());
        let manager = manager(&store, mailer.clone());

        let record = manager
            .send_now(manual(CampaignKind::RelanceT2), "secretariat")
            .await
            .unwrap();
        assert_eq!(record.sent_by, "secretariat");
        assert_eq!(record.sent_count, 1);
        assert_eq!(mailer.envelopes()[0].text_body, "Bonjour Jean");

        // The automatic reminder for the same category is now redundant
        let mut item = pending_item(CampaignKind::RelanceT2, past());
        item.mode = Some("libre".to_string());
        item.category = Some("R1".to_string());
        store.insert_scheduled(item.clone()).await;

        let scheduler = CampaignScheduler::new(
            Arc::new(store.clone()),
            Arc::new(pipeline(&store, mailer.clone())),
            fixed_clock(),
        );
        scheduler.tick().await.unwrap();

        let stored = manager.get(item.id).await.unwrap();
        assert_eq!(stored.status_enum(), Some(ScheduledCampaignStatus::Blocked));
        assert_eq!(mailer.sent_to().len(), 1);
    }

    #[tokio::test]
    async fn test_send_now_requires_transport() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::new());
        mailer.set_available(false);
        let manager = manager(&store, mailer);

        assert!(matches!(
            manager.send_now(manual(CampaignKind::RelanceT2), "secretariat").await,
            Err(CampaignError::Delivery(DeliveryError::TransportUnavailable(_)))
        ));
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_counts_records() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            CampaignRecordRepository::create(&store, record(CampaignKind::RelanceT2, false))
                .await
                .unwrap();
        }
        let manager = manager(&store, Arc::new(RecordingMailer::new()));

        let (records, total) = manager.history(2, 0).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(total, 3);
    }
}
