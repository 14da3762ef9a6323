//! Fixtures shared by the scheduled module tests

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tourneymail_common::types::{CampaignKind, TournamentId};
use tourneymail_storage::{
    CampaignRecordStatus, Contact, MemoryStore, NewCampaignRecord, Participant, RankingEntry,
    ScheduledCampaign, ScheduledCampaignStatus, Tournament,
};
use uuid::Uuid;

use super::clock::Clock;
use super::error::SendError;
use super::pipeline::DeliveryPipeline;
use super::request::CampaignRequest;
use super::resolver::AudienceStores;
use super::throttler::DeliverySettings;
use super::transport::{Envelope, Mailer};

pub const SEASON: &str = "2024-2025";

/// Clock stopped at 2025-05-01 10:00 UTC, 12:00 in the organization's calendar
pub struct FixedClock {
    now: DateTime<Utc>,
    offset: FixedOffset,
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }

    fn now_local(&self) -> NaiveDateTime {
        self.now.with_timezone(&self.offset).naive_local()
    }
}

pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock {
        now: Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap(),
        offset: FixedOffset::east_opt(2 * 3600).unwrap(),
    })
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Local time already due for the fixed clock
pub fn past() -> NaiveDateTime {
    date(2025, 5, 1).and_hms_opt(11, 30, 0).unwrap()
}

/// Local time not yet due for the fixed clock
pub fn future() -> NaiveDateTime {
    date(2025, 5, 1).and_hms_opt(12, 30, 0).unwrap()
}

pub fn contact(licence: &str, first_name: &str, email: Option<&str>) -> Contact {
    Contact {
        id: Uuid::new_v4(),
        licence: licence.to_string(),
        first_name: first_name.to_string(),
        last_name: "Dupont".to_string(),
        club: Some("CB Lyon".to_string()),
        email: email.map(str::to_string),
        active: true,
        last_contacted_at: None,
    }
}

pub fn ranking(licence: &str, rank_position: i32, total_points: i32) -> RankingEntry {
    RankingEntry {
        id: Uuid::new_v4(),
        season: SEASON.to_string(),
        mode: "libre".to_string(),
        category: "R1".to_string(),
        licence: licence.to_string(),
        rank_position,
        total_points,
    }
}

pub fn tournament(stage: &str, event_date: NaiveDate) -> Tournament {
    Tournament {
        id: Uuid::new_v4(),
        name: format!("Tournoi {}", stage.to_uppercase()),
        season: SEASON.to_string(),
        mode: "libre".to_string(),
        category: "R1".to_string(),
        stage: stage.to_string(),
        event_date,
        location: Some("Villeurbanne".to_string()),
    }
}

pub fn participant(tournament_id: TournamentId, licence: &str, email: Option<&str>) -> Participant {
    Participant {
        tournament_id,
        licence: licence.to_string(),
        email: email.map(str::to_string),
        final_position: None,
        points: None,
        withdrawn: false,
    }
}

pub fn request(kind: CampaignKind) -> CampaignRequest {
    CampaignRequest {
        kind,
        subject: "Sujet".to_string(),
        body: "Bonjour {first_name}".to_string(),
        outro: None,
        image_url: None,
        mode: None,
        category: None,
        tournament_id: None,
        recipient_ids: Vec::new(),
        context: Default::default(),
        test_mode: false,
        test_address: None,
        cc_address: None,
        scheduled_campaign_id: None,
    }
}

/// A delivered record for libre / R1
pub fn record(kind: CampaignKind, test_mode: bool) -> NewCampaignRecord {
    NewCampaignRecord {
        subject: "Sujet".to_string(),
        body: "Corps".to_string(),
        campaign_kind: kind,
        mode: Some("libre".to_string()),
        category: Some("R1".to_string()),
        tournament_id: None,
        recipients_count: 10,
        sent_count: 10,
        failed_count: 0,
        status: CampaignRecordStatus::Completed,
        test_mode,
        sent_by: "secretariat".to_string(),
        scheduled_campaign_id: None,
    }
}

pub fn pending_item(kind: CampaignKind, scheduled_at: NaiveDateTime) -> ScheduledCampaign {
    let now = Utc::now();
    ScheduledCampaign {
        id: Uuid::now_v7(),
        campaign_kind: kind.to_string(),
        subject: "Sujet".to_string(),
        body: "Bonjour {first_name}".to_string(),
        outro: None,
        image_url: None,
        scheduled_at,
        status: ScheduledCampaignStatus::Pending.to_string(),
        mode: None,
        category: None,
        tournament_id: None,
        recipient_ids: Vec::new(),
        context: serde_json::json!({}),
        test_mode: false,
        test_address: None,
        cc_address: None,
        created_by: "secretariat".to_string(),
        claimed_at: None,
        last_error: None,
        sent_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn pipeline(store: &MemoryStore, mailer: Arc<RecordingMailer>) -> DeliveryPipeline {
    DeliveryPipeline::new(
        AudienceStores::from_memory(store),
        Arc::new(store.clone()),
        mailer,
        fixed_clock(),
        DeliverySettings {
            send_delay: Duration::from_millis(1500),
            supervisor_address: None,
            organization: "Ligue".to_string(),
        },
    )
}

#[derive(Default)]
struct Recorded {
    envelopes: Vec<Envelope>,
    times: Vec<tokio::time::Instant>,
}

/// Mailer that records every call and fails for chosen addresses
pub struct RecordingMailer {
    failing: Vec<String>,
    available: Mutex<bool>,
    recorded: Mutex<Recorded>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::failing_for(&[])
    }

    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            failing: addresses.iter().map(|a| a.to_string()).collect(),
            available: Mutex::new(true),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub fn set_available(&self, available: bool) {
        *self.available.lock().unwrap() = available;
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.recorded.lock().unwrap().envelopes.clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.envelopes().into_iter().map(|e| e.to).collect()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.recorded.lock().unwrap().times.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, envelope: &Envelope) -> Result<String, SendError> {
        {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.envelopes.push(envelope.clone());
            recorded.times.push(tokio::time::Instant::now());
        }

        if self.failing.contains(&envelope.to) {
            Err(SendError::Temporary("421 try again later".to_string()))
        } else {
            Ok(format!("<{}@test>", Uuid::new_v4()))
        }
    }

    async fn check_available(&self) -> Result<(), SendError> {
        if *self.available.lock().unwrap() {
            Ok(())
        } else {
            Err(SendError::Temporary("connection refused".to_string()))
        }
    }
}
