//! Database models

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tourneymail_common::types::{
    CampaignKind, CampaignRecordId, ContactId, ScheduledCampaignId, TournamentId,
};
use uuid::Uuid;

/// Scheduled campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledCampaignStatus {
    Pending,
    Completed,
    Cancelled,
    Blocked,
    Failed,
}

impl ScheduledCampaignStatus {
    /// Terminal statuses have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScheduledCampaignStatus::Pending)
    }
}

impl std::fmt::Display for ScheduledCampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduledCampaignStatus::Pending => write!(f, "pending"),
            ScheduledCampaignStatus::Completed => write!(f, "completed"),
            ScheduledCampaignStatus::Cancelled => write!(f, "cancelled"),
            ScheduledCampaignStatus::Blocked => write!(f, "blocked"),
            ScheduledCampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ScheduledCampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduledCampaignStatus::Pending),
            "completed" => Ok(ScheduledCampaignStatus::Completed),
            "cancelled" => Ok(ScheduledCampaignStatus::Cancelled),
            "blocked" => Ok(ScheduledCampaignStatus::Blocked),
            "failed" => Ok(ScheduledCampaignStatus::Failed),
            _ => Err(format!("Invalid scheduled campaign status: {}", s)),
        }
    }
}

/// Scheduled campaign item
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScheduledCampaign {
    pub id: ScheduledCampaignId,
    pub campaign_kind: String,
    pub subject: String,
    pub body: String,
    pub outro: Option<String>,
    pub image_url: Option<String>,
    /// Organization-local wall clock time
    pub scheduled_at: NaiveDateTime,
    pub status: String,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub tournament_id: Option<TournamentId>,
    /// Explicit audience; empty means resolve dynamically
    pub recipient_ids: Vec<ContactId>,
    /// Free key/value context merged into every rendering
    pub context: serde_json::Value,
    pub test_mode: bool,
    pub test_address: Option<String>,
    pub cc_address: Option<String>,
    pub created_by: String,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledCampaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<ScheduledCampaignStatus> {
        self.status.parse().ok()
    }

    /// Get campaign kind enum
    pub fn kind(&self) -> Result<CampaignKind, String> {
        self.campaign_kind.parse()
    }

    /// An item is due when it is pending and its time has come
    pub fn is_due(&self, now_local: NaiveDateTime) -> bool {
        self.status_enum() == Some(ScheduledCampaignStatus::Pending) && self.scheduled_at <= now_local
    }

    /// Custom context as string pairs
    pub fn context_pairs(&self) -> Vec<(String, String)> {
        context_pairs(&self.context)
    }
}

/// Flatten a JSON object into string pairs; non-string values are rendered
/// as JSON text and nulls are dropped
pub fn context_pairs(context: &serde_json::Value) -> Vec<(String, String)> {
    context
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Create scheduled campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScheduledCampaign {
    pub campaign_kind: CampaignKind,
    pub subject: String,
    pub body: String,
    pub outro: Option<String>,
    pub image_url: Option<String>,
    pub scheduled_at: NaiveDateTime,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub tournament_id: Option<TournamentId>,
    #[serde(default)]
    pub recipient_ids: Vec<ContactId>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub test_mode: bool,
    pub test_address: Option<String>,
    pub cc_address: Option<String>,
    pub created_by: String,
}

/// Campaign record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignRecordStatus {
    Draft,
    Sending,
    Completed,
}

impl std::fmt::Display for CampaignRecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignRecordStatus::Draft => write!(f, "draft"),
            CampaignRecordStatus::Sending => write!(f, "sending"),
            CampaignRecordStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for CampaignRecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignRecordStatus::Draft),
            "sending" => Ok(CampaignRecordStatus::Sending),
            "completed" => Ok(CampaignRecordStatus::Completed),
            _ => Err(format!("Invalid campaign record status: {}", s)),
        }
    }
}

/// Campaign history record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: CampaignRecordId,
    pub subject: String,
    pub body: String,
    pub campaign_kind: String,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub tournament_id: Option<TournamentId>,
    pub recipients_count: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub status: String,
    pub test_mode: bool,
    pub sent_by: String,
    pub scheduled_campaign_id: Option<ScheduledCampaignId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CampaignRecord {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignRecordStatus> {
        self.status.parse().ok()
    }

    /// Get campaign kind enum
    pub fn kind(&self) -> Option<CampaignKind> {
        self.campaign_kind.parse().ok()
    }

    /// Records that count as a real delivery to the audience
    pub fn is_delivered(&self) -> bool {
        !self.test_mode
            && matches!(
                self.status_enum(),
                Some(CampaignRecordStatus::Completed) | Some(CampaignRecordStatus::Sending)
            )
    }
}

/// Create campaign record input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaignRecord {
    pub subject: String,
    pub body: String,
    pub campaign_kind: CampaignKind,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub tournament_id: Option<TournamentId>,
    pub recipients_count: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub status: CampaignRecordStatus,
    pub test_mode: bool,
    pub sent_by: String,
    pub scheduled_campaign_id: Option<ScheduledCampaignId>,
}

/// Contact directory entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub licence: String,
    pub first_name: String,
    pub last_name: String,
    pub club: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub last_contacted_at: Option<DateTime<Utc>>,
}

impl Contact {
    /// "First Last"
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Which contacts a reminder campaign targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityFilter {
    pub season: String,
    pub mode: String,
    pub category: String,
    /// Contacts already registered in this tournament are excluded
    pub exclude_registered_in: Option<TournamentId>,
}

/// One line of a season ranking
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RankingEntry {
    pub id: Uuid,
    pub season: String,
    pub mode: String,
    pub category: String,
    pub licence: String,
    pub rank_position: i32,
    pub total_points: i32,
}

/// Tournament or finale
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub season: String,
    pub mode: String,
    pub category: String,
    /// "t1", "t2", "t3" or "finale"
    pub stage: String,
    pub event_date: NaiveDate,
    pub location: Option<String>,
}

impl Tournament {
    pub fn is_finale(&self) -> bool {
        self.stage == "finale"
    }
}

/// Registration of a player in a tournament
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Participant {
    pub tournament_id: TournamentId,
    pub licence: String,
    /// Address given at registration, more specific than the directory one
    pub email: Option<String>,
    pub final_position: Option<i32>,
    pub points: Option<i32>,
    pub withdrawn: bool,
}
