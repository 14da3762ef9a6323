//! Tournament and finale registry

use async_trait::async_trait;
use tourneymail_common::types::TournamentId;
use tourneymail_common::Result;

use crate::db::{db_err, DatabasePool};
use crate::models::{Participant, Tournament};

/// Tournament registry trait
#[async_trait]
pub trait TournamentRepository: Send + Sync {
    async fn get(&self, id: TournamentId) -> Result<Option<Tournament>>;

    /// Registered, non-withdrawn participants
    async fn participants(&self, id: TournamentId) -> Result<Vec<Participant>>;

    /// The tournament of a given stage ("t1", "t2", "t3", "finale")
    async fn find_stage(
        &self,
        season: &str,
        mode: &str,
        category: &str,
        stage: &str,
    ) -> Result<Option<Tournament>>;
}

/// Database tournament repository
#[derive(Clone)]
pub struct DbTournamentRepository {
    pool: DatabasePool,
}

impl DbTournamentRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TournamentRepository for DbTournamentRepository {
    async fn get(&self, id: TournamentId) -> Result<Option<Tournament>> {
        sqlx::query_as::<_, Tournament>("SELECT * FROM tournaments WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn participants(&self, id: TournamentId) -> Result<Vec<Participant>> {
        sqlx::query_as::<_, Participant>(
            r#"
            SELECT * FROM tournament_participants
            WHERE tournament_id = $1 AND withdrawn = FALSE
            ORDER BY final_position ASC NULLS LAST, licence ASC
            "#,
        )
        .bind(id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn find_stage(
        &self,
        season: &str,
        mode: &str,
        category: &str,
        stage: &str,
    ) -> Result<Option<Tournament>> {
        sqlx::query_as::<_, Tournament>(
            r#"
            SELECT * FROM tournaments
            WHERE season = $1
              AND UPPER(mode) = UPPER($2)
              AND UPPER(category) = UPPER($3)
              AND stage = $4
            ORDER BY event_date DESC
            LIMIT 1
            "#,
        )
        .bind(season)
        .bind(mode)
        .bind(category)
        .bind(stage)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }
}
