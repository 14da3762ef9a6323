//! Campaign record repository

use async_trait::async_trait;
use sqlx::PgExecutor;
use tourneymail_common::types::CampaignKind;
use tourneymail_common::Result;
use uuid::Uuid;

use crate::db::{db_err, DatabasePool};
use crate::models::{CampaignRecord, CampaignRecordStatus, NewCampaignRecord};

/// Campaign record repository trait
#[async_trait]
pub trait CampaignRecordRepository: Send + Sync {
    async fn create(&self, input: NewCampaignRecord) -> Result<CampaignRecord>;

    /// Non-test records of `kind` in status completed or sending
    async fn list_delivered(&self, kind: CampaignKind) -> Result<Vec<CampaignRecord>>;

    /// History, most recent first
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CampaignRecord>>;

    async fn count(&self) -> Result<i64>;
}

/// Database campaign record repository
#[derive(Clone)]
pub struct DbCampaignRecordRepository {
    pool: DatabasePool,
}

impl DbCampaignRecordRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Insert a record on any executor, so it can join a transaction
pub(crate) async fn insert_record<'e, E>(executor: E, input: NewCampaignRecord) -> Result<CampaignRecord>
where
    E: PgExecutor<'e>,
{
    let completed = input.status == CampaignRecordStatus::Completed;

    sqlx::query_as::<_, CampaignRecord>(
        r#"
        INSERT INTO campaign_records (
            id, subject, body, campaign_kind, mode, category, tournament_id,
            recipients_count, sent_count, failed_count, status, test_mode,
            sent_by, scheduled_campaign_id, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                CASE WHEN $15 THEN NOW() ELSE NULL END)
        RETURNING *
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(&input.subject)
    .bind(&input.body)
    .bind(input.campaign_kind.to_string())
    .bind(&input.mode)
    .bind(&input.category)
    .bind(input.tournament_id)
    .bind(input.recipients_count)
    .bind(input.sent_count)
    .bind(input.failed_count)
    .bind(input.status.to_string())
    .bind(input.test_mode)
    .bind(&input.sent_by)
    .bind(input.scheduled_campaign_id)
    .bind(completed)
    .fetch_one(executor)
    .await
    .map_err(db_err)
}

#[async_trait]
impl CampaignRecordRepository for DbCampaignRecordRepository {
    async fn create(&self, input: NewCampaignRecord) -> Result<CampaignRecord> {
        insert_record(self.pool.pool(), input).await
    }

    async fn list_delivered(&self, kind: CampaignKind) -> Result<Vec<CampaignRecord>> {
        sqlx::query_as::<_, CampaignRecord>(
            r#"
            SELECT * FROM campaign_records
            WHERE campaign_kind = $1
              AND status IN ('completed', 'sending')
              AND test_mode IS NOT TRUE
            ORDER BY created_at DESC
            "#,
        )
        .bind(kind.to_string())
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CampaignRecord>> {
        sqlx::query_as::<_, CampaignRecord>(
            r#"
            SELECT * FROM campaign_records
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM campaign_records")
            .fetch_one(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(count.0)
    }
}
