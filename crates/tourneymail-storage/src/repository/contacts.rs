//! Contact directory repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tourneymail_common::types::ContactId;
use tourneymail_common::Result;

use crate::db::{db_err, DatabasePool};
use crate::models::{Contact, EligibilityFilter};

/// Contact directory trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn get_by_ids(&self, ids: &[ContactId]) -> Result<Vec<Contact>>;

    async fn get_by_licences(&self, licences: &[String]) -> Result<Vec<Contact>>;

    /// Active contacts ranked in the filter's season/mode/category
    async fn list_eligible(&self, filter: &EligibilityFilter) -> Result<Vec<Contact>>;

    /// Stamp the last-contacted marker
    async fn mark_contacted(&self, id: ContactId, at: DateTime<Utc>) -> Result<()>;
}

/// Database contact repository
#[derive(Clone)]
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn get_by_ids(&self, ids: &[ContactId]) -> Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE id = ANY($1) ORDER BY last_name, first_name",
        )
        .bind(ids)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn get_by_licences(&self, licences: &[String]) -> Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE licence = ANY($1)")
            .bind(licences)
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn list_eligible(&self, filter: &EligibilityFilter) -> Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT c.* FROM contacts c
            JOIN ranking_entries r ON r.licence = c.licence
            WHERE c.active = TRUE
              AND r.season = $1
              AND UPPER(r.mode) = UPPER($2)
              AND UPPER(r.category) = UPPER($3)
              AND ($4::uuid IS NULL OR NOT EXISTS (
                    SELECT 1 FROM tournament_participants p
                    WHERE p.tournament_id = $4
                      AND p.licence = c.licence
                      AND p.withdrawn = FALSE
              ))
            ORDER BY r.rank_position ASC
            "#,
        )
        .bind(&filter.season)
        .bind(&filter.mode)
        .bind(&filter.category)
        .bind(filter.exclude_registered_in)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn mark_contacted(&self, id: ContactId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE contacts SET last_contacted_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
