//! In-memory storage backend
//!
//! Implements every repository trait over one lock-guarded state, so the
//! completion of an item and the insert of its record are observed together.
//! Used for dry runs (`database.backend = "memory"`) and in tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tourneymail_common::types::{
    CampaignKind, ContactId, ScheduledCampaignId, TournamentId,
};
use tourneymail_common::{Error, Result};
use uuid::Uuid;

use crate::models::{
    CampaignRecord, CampaignRecordStatus, Contact, EligibilityFilter, NewCampaignRecord,
    NewScheduledCampaign, Participant, RankingEntry, ScheduledCampaign, ScheduledCampaignStatus,
    Tournament,
};
use crate::repository::{
    CampaignRecordRepository, ContactRepository, RankingRepository, ScheduledCampaignRepository,
    TournamentRepository,
};

#[derive(Default)]
struct State {
    scheduled: HashMap<ScheduledCampaignId, ScheduledCampaign>,
    records: Vec<CampaignRecord>,
    contacts: HashMap<ContactId, Contact>,
    rankings: Vec<RankingEntry>,
    tournaments: HashMap<TournamentId, Tournament>,
    participants: Vec<Participant>,
}

/// In-memory store implementing all repositories
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_contact(&self, contact: Contact) {
        let mut state = self.state.write().await;
        state.contacts.insert(contact.id, contact);
    }

    pub async fn insert_ranking(&self, entry: RankingEntry) {
        self.state.write().await.rankings.push(entry);
    }

    pub async fn insert_tournament(&self, tournament: Tournament) {
        let mut state = self.state.write().await;
        state.tournaments.insert(tournament.id, tournament);
    }

    pub async fn insert_participant(&self, participant: Participant) {
        self.state.write().await.participants.push(participant);
    }

    /// Put an item in place as-is, bypassing `create`
    pub async fn insert_scheduled(&self, item: ScheduledCampaign) {
        let mut state = self.state.write().await;
        state.scheduled.insert(item.id, item);
    }

    pub async fn contact(&self, id: ContactId) -> Option<Contact> {
        self.state.read().await.contacts.get(&id).cloned()
    }

    pub async fn records(&self) -> Vec<CampaignRecord> {
        self.state.read().await.records.clone()
    }

    fn build_record(input: NewCampaignRecord) -> CampaignRecord {
        let now = Utc::now();
        CampaignRecord {
            id: Uuid::now_v7(),
            subject: input.subject,
            body: input.body,
            campaign_kind: input.campaign_kind.to_string(),
            mode: input.mode,
            category: input.category,
            tournament_id: input.tournament_id,
            recipients_count: input.recipients_count,
            sent_count: input.sent_count,
            failed_count: input.failed_count,
            status: input.status.to_string(),
            test_mode: input.test_mode,
            sent_by: input.sent_by,
            scheduled_campaign_id: input.scheduled_campaign_id,
            created_at: now,
            completed_at: (input.status == CampaignRecordStatus::Completed).then_some(now),
        }
    }

    async fn transition(
        &self,
        id: ScheduledCampaignId,
        status: ScheduledCampaignStatus,
        reason: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.scheduled.get_mut(&id) {
            Some(item) if item.status_enum() == Some(ScheduledCampaignStatus::Pending) => {
                item.status = status.to_string();
                item.last_error = Some(reason.to_string());
                item.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn claim_is_live(claimed_at: Option<DateTime<Utc>>, lease: Duration, now: DateTime<Utc>) -> bool {
    claimed_at.map(|at| at >= now - lease).unwrap_or(false)
}

fn same_label(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[async_trait]
impl ScheduledCampaignRepository for MemoryStore {
    async fn create(&self, input: NewScheduledCampaign) -> Result<ScheduledCampaign> {
        let now = Utc::now();
        let item = ScheduledCampaign {
            id: Uuid::now_v7(),
            campaign_kind: input.campaign_kind.to_string(),
            subject: input.subject,
            body: input.body,
            outro: input.outro,
            image_url: input.image_url,
            scheduled_at: input.scheduled_at,
            status: ScheduledCampaignStatus::Pending.to_string(),
            mode: input.mode,
            category: input.category,
            tournament_id: input.tournament_id,
            recipient_ids: input.recipient_ids,
            context: input.context.unwrap_or_else(|| serde_json::json!({})),
            test_mode: input.test_mode,
            test_address: input.test_address,
            cc_address: input.cc_address,
            created_by: input.created_by,
            claimed_at: None,
            last_error: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.scheduled.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get(&self, id: ScheduledCampaignId) -> Result<Option<ScheduledCampaign>> {
        Ok(self.state.read().await.scheduled.get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<ScheduledCampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ScheduledCampaign>> {
        let state = self.state.read().await;
        let mut items: Vec<ScheduledCampaign> = state
            .scheduled
            .values()
            .filter(|item| status.map_or(true, |s| item.status_enum() == Some(s)))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));

        Ok(items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_pending(&self) -> Result<Vec<ScheduledCampaign>> {
        let state = self.state.read().await;
        let mut items: Vec<ScheduledCampaign> = state
            .scheduled
            .values()
            .filter(|item| item.status_enum() == Some(ScheduledCampaignStatus::Pending))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(items)
    }

    async fn claim(&self, id: ScheduledCampaignId, lease: Duration) -> Result<bool> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        match state.scheduled.get_mut(&id) {
            Some(item)
                if item.status_enum() == Some(ScheduledCampaignStatus::Pending)
                    && !claim_is_live(item.claimed_at, lease, now) =>
            {
                item.claimed_at = Some(now);
                item.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel(
        &self,
        id: ScheduledCampaignId,
        lease: Duration,
    ) -> Result<Option<ScheduledCampaign>> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        match state.scheduled.get_mut(&id) {
            Some(item)
                if item.status_enum() == Some(ScheduledCampaignStatus::Pending)
                    && !claim_is_live(item.claimed_at, lease, now) =>
            {
                item.status = ScheduledCampaignStatus::Cancelled.to_string();
                item.updated_at = now;
                Ok(Some(item.clone()))
            }
            _ => Ok(None),
        }
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
        let now = Utc::now();
        let mut state = self.state.write().await;

        let item = state
            .scheduled
            .get_mut(&id)
            .filter(|item| item.status_enum() == Some(ScheduledCampaignStatus::Pending))
            .ok_or_else(|| {
                Error::Conflict(format!("Scheduled campaign {} is no longer pending", id))
            })?;
        item.status = ScheduledCampaignStatus::Completed.to_string();
        item.sent_at = Some(now);
        item.updated_at = now;

        let created = Self::build_record(record);
        state.records.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl CampaignRecordRepository for MemoryStore {
    async fn create(&self, input: NewCampaignRecord) -> Result<CampaignRecord> {
        let created = Self::build_record(input);
        self.state.write().await.records.push(created.clone());
        Ok(created)
    }

    async fn list_delivered(&self, kind: CampaignKind) -> Result<Vec<CampaignRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|r| r.kind() == Some(kind) && r.is_delivered())
            .cloned()
            .collect())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CampaignRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.state.read().await.records.len() as i64)
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn get_by_ids(&self, ids: &[ContactId]) -> Result<Vec<Contact>> {
        let state = self.state.read().await;
        let mut contacts: Vec<Contact> = ids
            .iter()
            .filter_map(|id| state.contacts.get(id).cloned())
            .collect();
        contacts.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then(a.first_name.cmp(&b.first_name))
        });
        Ok(contacts)
    }

    async fn get_by_licences(&self, licences: &[String]) -> Result<Vec<Contact>> {
        let state = self.state.read().await;
        Ok(state
            .contacts
            .values()
            .filter(|c| licences.contains(&c.licence))
            .cloned()
            .collect())
    }

    async fn list_eligible(&self, filter: &EligibilityFilter) -> Result<Vec<Contact>> {
        let state = self.state.read().await;

        let mut ranked: Vec<&RankingEntry> = state
            .rankings
            .iter()
            .filter(|r| {
                r.season == filter.season
                    && same_label(&r.mode, &filter.mode)
                    && same_label(&r.category, &filter.category)
            })
            .collect();
        ranked.sort_by_key(|r| r.rank_position);

        let registered = |licence: &str| {
            filter.exclude_registered_in.map_or(false, |tid| {
                state
                    .participants
                    .iter()
                    .any(|p| p.tournament_id == tid && p.licence == licence && !p.withdrawn)
            })
        };

        Ok(ranked
            .into_iter()
            .filter(|r| !registered(&r.licence))
            .filter_map(|r| {
                state
                    .contacts
                    .values()
                    .find(|c| c.licence == r.licence && c.active)
                    .cloned()
            })
            .collect())
    }

    async fn mark_contacted(&self, id: ContactId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(contact) = state.contacts.get_mut(&id) {
            contact.last_contacted_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl RankingRepository for MemoryStore {
    async fn season_ranking(
        &self,
        season: &str,
        mode: &str,
        category: &str,
    ) -> Result<Vec<RankingEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<RankingEntry> = state
            .rankings
            .iter()
            .filter(|r| {
                r.season == season && same_label(&r.mode, mode) && same_label(&r.category, category)
            })
            .cloned()
            .collect();
        entries.sort_by_key(|r| r.rank_position);
        Ok(entries)
    }
}

#[async_trait]
impl TournamentRepository for MemoryStore {
    async fn get(&self, id: TournamentId) -> Result<Option<Tournament>> {
        Ok(self.state.read().await.tournaments.get(&id).cloned())
    }

    async fn participants(&self, id: TournamentId) -> Result<Vec<Participant>> {
        let state = self.state.read().await;
        let mut participants: Vec<Participant> = state
            .participants
            .iter()
            .filter(|p| p.tournament_id == id && !p.withdrawn)
            .cloned()
            .collect();
        participants.sort_by(|a, b| {
            let pos = |p: &Participant| p.final_position.unwrap_or(i32::MAX);
            pos(a).cmp(&pos(b)).then(a.licence.cmp(&b.licence))
        });
        Ok(participants)
    }

    async fn find_stage(
        &self,
        season: &str,
        mode: &str,
        category: &str,
        stage: &str,
    ) -> Result<Option<Tournament>> {
        let state = self.state.read().await;
        Ok(state
            .tournaments
            .values()
            .filter(|t| {
                t.season == season
                    && same_label(&t.mode, mode)
                    && same_label(&t.category, category)
                    && t.stage == stage
            })
            .max_by_key(|t| t.event_date)
            .cloned())
    }
}
