//! Scheduled campaign repository
//!
//! Every status change is a conditional update on `status = 'pending'`, so an
//! item leaves pending at most once whatever the number of writers.

use async_trait::async_trait;
use chrono::Duration;
use tourneymail_common::types::ScheduledCampaignId;
use tourneymail_common::{Error, Result};
use uuid::Uuid;

use super::campaign_records::insert_record;
use crate::db::{db_err, DatabasePool};
use crate::models::{
    CampaignRecord, NewCampaignRecord, NewScheduledCampaign, ScheduledCampaign,
    ScheduledCampaignStatus,
};

/// Scheduled campaign repository trait
#[async_trait]
pub trait ScheduledCampaignRepository: Send + Sync {
    /// Persist a new pending item
    async fn create(&self, input: NewScheduledCampaign) -> Result<ScheduledCampaign>;

    async fn get(&self, id: ScheduledCampaignId) -> Result<Option<ScheduledCampaign>>;

    /// List items, soonest first
    async fn list(
        &self,
        status: Option<ScheduledCampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ScheduledCampaign>>;

    /// All pending items, soonest first
    async fn list_pending(&self) -> Result<Vec<ScheduledCampaign>>;

    /// Reserve a pending item for processing.
    ///
    /// Succeeds when the item is pending and either unclaimed or claimed
    /// longer ago than `lease`.
    async fn claim(&self, id: ScheduledCampaignId, lease: Duration) -> Result<bool>;

    /// pending -> cancelled, refused while a live claim exists
    async fn cancel(
        &self,
        id: ScheduledCampaignId,
        lease: Duration,
    ) -> Result<Option<ScheduledCampaign>>;

    /// pending -> blocked
    async fn mark_blocked(&self, id: ScheduledCampaignId, reason: &str) -> Result<bool>;

    /// pending -> failed
    async fn mark_failed(&self, id: ScheduledCampaignId, reason: &str) -> Result<bool>;

    /// pending -> completed, stamping `sent_at` and writing the campaign
    /// record atomically with the status change
    async fn complete(
        &self,
        id: ScheduledCampaignId,
        record: NewCampaignRecord,
    ) -> Result<CampaignRecord>;
}

/// Database scheduled campaign repository
#[derive(Clone)]
pub struct DbScheduledCampaignRepository {
    pool: DatabasePool,
}

impl DbScheduledCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn transition(
        &self,
        id: ScheduledCampaignId,
        status: ScheduledCampaignStatus,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_campaigns SET
                status = $2,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(reason)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}

fn lease_secs(lease: Duration) -> f64 {
    lease.num_milliseconds() as f64 / 1000.0
}

#[async_trait]
impl ScheduledCampaignRepository for DbScheduledCampaignRepository {
    async fn create(&self, input: NewScheduledCampaign) -> Result<ScheduledCampaign> {
        let id = Uuid::now_v7();
        let context = input.context.unwrap_or_else(|| serde_json::json!({}));

        sqlx::query_as::<_, ScheduledCampaign>(
            r#"
            INSERT INTO scheduled_campaigns (
                id, campaign_kind, subject, body, outro, image_url, scheduled_at,
                mode, category, tournament_id, recipient_ids, context,
                test_mode, test_address, cc_address, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.campaign_kind.to_string())
        .bind(&input.subject)
        .bind(&input.body)
        .bind(&input.outro)
        .bind(&input.image_url)
        .bind(input.scheduled_at)
        .bind(&input.mode)
        .bind(&input.category)
        .bind(input.tournament_id)
        .bind(&input.recipient_ids)
        .bind(&context)
        .bind(input.test_mode)
        .bind(&input.test_address)
        .bind(&input.cc_address)
        .bind(&input.created_by)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn get(&self, id: ScheduledCampaignId) -> Result<Option<ScheduledCampaign>> {
        sqlx::query_as::<_, ScheduledCampaign>("SELECT * FROM scheduled_campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn list(
        &self,
        status: Option<ScheduledCampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ScheduledCampaign>> {
        match status {
            Some(status) => sqlx::query_as::<_, ScheduledCampaign>(
                r#"
                SELECT * FROM scheduled_campaigns
                WHERE status = $1
                ORDER BY scheduled_at ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_err),
            None => sqlx::query_as::<_, ScheduledCampaign>(
                r#"
                SELECT * FROM scheduled_campaigns
                ORDER BY scheduled_at ASC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_err),
        }
    }

    async fn list_pending(&self) -> Result<Vec<ScheduledCampaign>> {
        sqlx::query_as::<_, ScheduledCampaign>(
            r#"
            SELECT * FROM scheduled_campaigns
            WHERE status = 'pending'
            ORDER BY scheduled_at ASC, created_at ASC
            "#,
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn claim(&self, id: ScheduledCampaignId, lease: Duration) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_campaigns SET
                claimed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
              AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $2))
            "#,
        )
        .bind(id)
        .bind(lease_secs(lease))
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel(
        &self,
        id: ScheduledCampaignId,
        lease: Duration,
    ) -> Result<Option<ScheduledCampaign>> {
        sqlx::query_as::<_, ScheduledCampaign>(
            r#"
            UPDATE scheduled_campaigns SET
                status = 'cancelled',
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
              AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $2))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lease_secs(lease))
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn mark_blocked(&self, id: ScheduledCampaignId, reason: &str) -> Result<bool> {
        self.transition(id, ScheduledCampaignStatus::Blocked, reason)
            .await
    }

    async fn mark_failed(&self, id: ScheduledCampaignId, reason: &str) -> Result<bool> {
        self.transition(id, ScheduledCampaignStatus::Failed, reason)
            .await
    }

    async fn complete(
        &self,
        id: ScheduledCampaignId,
        record: NewCampaignRecord,
    ) -> Result<CampaignRecord> {
        let mut tx = self.pool.pool().begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            r#"
            UPDATE scheduled_campaigns SET
                status = 'completed',
                sent_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Err(Error::Conflict(format!(
                "Scheduled campaign {} is no longer pending",
                id
            )));
        }

        let created = insert_record(&mut *tx, record).await?;
        tx.commit().await.map_err(db_err)?;

        Ok(created)
    }
}
