//! Season ranking repository

use async_trait::async_trait;
use tourneymail_common::Result;

use crate::db::{db_err, DatabasePool};
use crate::models::RankingEntry;

/// Ranking store trait
#[async_trait]
pub trait RankingRepository: Send + Sync {
    /// Ranking of one season/mode/category, best rank first
    async fn season_ranking(
        &self,
        season: &str,
        mode: &str,
        category: &str,
    ) -> Result<Vec<RankingEntry>>;
}

/// Database ranking repository
#[derive(Clone)]
pub struct DbRankingRepository {
    pool: DatabasePool,
}

impl DbRankingRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RankingRepository for DbRankingRepository {
    async fn season_ranking(
        &self,
        season: &str,
        mode: &str,
        category: &str,
    ) -> Result<Vec<RankingEntry>> {
        sqlx::query_as::<_, RankingEntry>(
            r#"
            SELECT * FROM ranking_entries
            WHERE season = $1
              AND UPPER(mode) = UPPER($2)
              AND UPPER(category) = UPPER($3)
            ORDER BY rank_position ASC
            "#,
        )
        .bind(season)
        .bind(mode)
        .bind(category)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }
}
