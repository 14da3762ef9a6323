//! Conflict Guard - Keeps the scheduler from repeating a delivered campaign

use std::sync::Arc;
use tourneymail_common::Result;
use tourneymail_storage::{CampaignRecord, CampaignRecordRepository};
use tracing::info;

use super::request::CampaignRequest;

/// Checks campaign history before an automatic send
pub struct ConflictGuard {
    records: Arc<dyn CampaignRecordRepository>,
}

impl ConflictGuard {
    pub fn new(records: Arc<dyn CampaignRecordRepository>) -> Self {
        Self { records }
    }

    /// Whether the request duplicates a campaign already delivered
    pub async fn should_block(&self, request: &CampaignRequest) -> Result<bool> {
        Ok(self.find_conflict(request).await?.is_some())
    }

    /// The delivered record an automatic send would duplicate.
    ///
    /// Test-mode requests never conflict.
    pub async fn find_conflict(&self, request: &CampaignRequest) -> Result<Option<CampaignRecord>> {
        if request.test_mode {
            return Ok(None);
        }

        let delivered = self.records.list_delivered(request.kind).await?;
        let conflict = delivered.into_iter().find(|r| covers(r, request));

        if let Some(record) = &conflict {
            info!(
                "Campaign {} already delivered by {} (record {})",
                request.kind, record.sent_by, record.id
            );
        }
        Ok(conflict)
    }
}

/// A record without a mode or category applies to every mode or category
fn covers(record: &CampaignRecord, request: &CampaignRequest) -> bool {
    if !record.is_delivered() || record.kind() != Some(request.kind) {
        return false;
    }

    let label_matches = |stored: Option<&str>, wanted: Option<&str>| match (stored, wanted) {
        (None, _) => true,
        (Some(s), Some(w)) => s.eq_ignore_ascii_case(w),
        (Some(_), None) => false,
    };

    label_matches(record.mode.as_deref(), request.mode.as_deref())
        && label_matches(record.category.as_deref(), request.category.as_deref())
        && request
            .tournament_id
            .map_or(true, |t| record.tournament_id == Some(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduled::test_support::*;
    use tourneymail_common::types::CampaignKind;
    use tourneymail_storage::{CampaignRecordStatus, MemoryStore};

    fn guard(store: &MemoryStore) -> ConflictGuard {
        ConflictGuard::new(Arc::new(store.clone()))
    }

    fn reminder() -> CampaignRequest {
        let mut req = request(CampaignKind::RelanceT2);
        req.mode = Some("libre".to_string());
        req.category = Some("R1".to_string());
        req
    }

    #[tokio::test]
    async fn test_blocks_after_manual_delivery() {
        let store = MemoryStore::new();
        let mut manual = record(CampaignKind::RelanceT2, false);
        manual.mode = Some("LIBRE".to_string());
        manual.sent_by = "secretariat".to_string();
        CampaignRecordRepository::create(&store, manual).await.unwrap();

        assert!(guard(&store).should_block(&reminder()).await.unwrap());
    }

    #[tokio::test]
    async fn test_null_tags_match_everything() {
        let store = MemoryStore::new();
        let mut broad = record(CampaignKind::RelanceT2, false);
        broad.mode = None;
        broad.category = None;
        CampaignRecordRepository::create(&store, broad).await.unwrap();

        assert!(guard(&store).should_block(&reminder()).await.unwrap());
    }

    #[tokio::test]
    async fn test_ignores_other_category_drafts_and_tests() {
        let store = MemoryStore::new();

        let mut other = record(CampaignKind::RelanceT2, false);
        other.category = Some("R2".to_string());
        CampaignRecordRepository::create(&store, other).await.unwrap();

        let mut draft = record(CampaignKind::RelanceT2, false);
        draft.status = CampaignRecordStatus::Draft;
        CampaignRecordRepository::create(&store, draft).await.unwrap();

        CampaignRecordRepository::create(&store, record(CampaignKind::RelanceT2, true))
            .await
            .unwrap();
        CampaignRecordRepository::create(&store, record(CampaignKind::RelanceT3, false))
            .await
            .unwrap();

        assert!(!guard(&store).should_block(&reminder()).await.unwrap());
    }

    #[tokio::test]
    async fn test_sending_record_counts_as_delivered() {
        let store = MemoryStore::new();
        let mut sending = record(CampaignKind::RelanceT2, false);
        sending.status = CampaignRecordStatus::Sending;
        CampaignRecordRepository::create(&store, sending).await.unwrap();

        assert!(guard(&store).should_block(&reminder()).await.unwrap());
    }

    #[tokio::test]
    async fn test_tournament_must_match_when_given() {
        let store = MemoryStore::new();
        let t1 = uuid::Uuid::new_v4();
        let mut results = record(CampaignKind::TournamentResults, false);
        results.tournament_id = Some(t1);
        CampaignRecordRepository::create(&store, results).await.unwrap();

        let mut req = request(CampaignKind::TournamentResults);
        req.mode = Some("libre".to_string());
        req.category = Some("R1".to_string());
        req.tournament_id = Some(uuid::Uuid::new_v4());
        assert!(!guard(&store).should_block(&req).await.unwrap());

        req.tournament_id = Some(t1);
        assert!(guard(&store).should_block(&req).await.unwrap());
    }

    #[tokio::test]
    async fn test_untagged_custom_record_blocks_custom() {
        let store = MemoryStore::new();
        let mut broad = record(CampaignKind::Custom, false);
        broad.mode = None;
        broad.category = None;
        broad.sent_by = "secretariat".to_string();
        CampaignRecordRepository::create(&store, broad).await.unwrap();

        assert!(guard(&store)
            .should_block(&request(CampaignKind::Custom))
            .await
            .unwrap());

        // Other kinds are unaffected
        assert!(!guard(&store).should_block(&reminder()).await.unwrap());
    }

    #[tokio::test]
    async fn test_test_mode_bypasses_guard() {
        let store = MemoryStore::new();
        CampaignRecordRepository::create(&store, record(CampaignKind::RelanceT2, false))
            .await
            .unwrap();

        let mut req = reminder();
        req.test_mode = true;
        assert!(!guard(&store).should_block(&req).await.unwrap());
    }
}
