//! Shared handler state

use std::sync::Arc;
use tourneymail_core::{CampaignManager, CampaignScheduler};
use tourneymail_storage::DatabasePool;

/// Application state shared by all handlers
pub struct AppState {
    pub manager: Arc<CampaignManager>,
    pub scheduler: Arc<CampaignScheduler>,
    /// Absent when running on the in-memory backend
    pub db_pool: Option<DatabasePool>,
}
