//! Recipient Resolver - Turns a campaign kind into its audience
//!
//! Every campaign kind is bound to one audience strategy. Strategies read
//! the contact directory, season rankings, the tournament registry and the
//! campaign history; all of them produce the same `Resolution` shape.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tourneymail_common::types::{CampaignKind, ContactId, EmailAddress};
use tourneymail_storage::{
    CampaignRecordRepository, CampaignRecordStatus, Contact, ContactRepository,
    EligibilityFilter, MemoryStore, RankingRepository, Tournament, TournamentRepository,
};
use tracing::debug;

use super::clock::{season_of, Clock};
use super::error::DeliveryError;
use super::request::CampaignRequest;
use super::template::{deadline_for, format_date, keys, parse_date, TemplateContext};

/// One person a campaign is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    /// Directory entry, absent for test recipients and unknown participants
    pub contact_id: Option<ContactId>,
    pub name: String,
    /// Per-recipient placeholder values
    pub context: TemplateContext,
}

/// Audience of one campaign
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub recipients: Vec<Recipient>,
    /// Values computed once for the whole campaign
    pub shared: TemplateContext,
}

/// Read access to the data audiences are computed from
#[derive(Clone)]
pub struct AudienceStores {
    pub contacts: Arc<dyn ContactRepository>,
    pub rankings: Arc<dyn RankingRepository>,
    pub tournaments: Arc<dyn TournamentRepository>,
    pub records: Arc<dyn CampaignRecordRepository>,
}

impl AudienceStores {
    pub fn from_memory(store: &MemoryStore) -> Self {
        Self {
            contacts: Arc::new(store.clone()),
            rankings: Arc::new(store.clone()),
            tournaments: Arc::new(store.clone()),
            records: Arc::new(store.clone()),
        }
    }
}

/// Number of ranked players invited to the finale
pub fn qualified_count(ranked_players: usize) -> usize {
    if ranked_players < 9 {
        4
    } else {
        6
    }
}

struct Audience<'a> {
    request: &'a CampaignRequest,
    season: &'a str,
    stores: &'a AudienceStores,
}

#[async_trait]
trait AudienceStrategy: Send + Sync {
    async fn resolve(&self, audience: &Audience<'_>) -> Result<Resolution, DeliveryError>;
}

fn strategy_for(kind: CampaignKind) -> &'static dyn AudienceStrategy {
    match kind {
        CampaignKind::Custom => &ExplicitList,
        CampaignKind::RelanceT2 => &RegistrationReminder { stage: "t2" },
        CampaignKind::RelanceT3 => &RegistrationReminder { stage: "t3" },
        CampaignKind::RelanceFinale => &FinaleReminder,
        CampaignKind::TournamentResults => &TournamentAudience { finale_only: false },
        CampaignKind::FinaleConvocation => &TournamentAudience { finale_only: true },
    }
}

/// Resolves the audience of a campaign request
pub struct RecipientResolver {
    stores: AudienceStores,
    clock: Arc<dyn Clock>,
    organization: String,
}

impl RecipientResolver {
    pub fn new(stores: AudienceStores, clock: Arc<dyn Clock>, organization: impl Into<String>) -> Self {
        Self {
            stores,
            clock,
            organization: organization.into(),
        }
    }

    pub fn stores(&self) -> &AudienceStores {
        &self.stores
    }

    /// Compute recipients and shared context.
    ///
    /// In test mode the audience is still computed, then replaced by a
    /// single recipient at the test address.
    pub async fn resolve(&self, request: &CampaignRequest) -> Result<Resolution, DeliveryError> {
        let season = request
            .context
            .get(keys::SEASON)
            .cloned()
            .unwrap_or_else(|| season_of(self.clock.today()));

        let audience = Audience {
            request,
            season: &season,
            stores: &self.stores,
        };
        let mut resolution = strategy_for(request.kind).resolve(&audience).await?;

        resolution
            .shared
            .insert(keys::ORGANIZATION.to_string(), self.organization.clone());
        resolution.shared.insert(keys::SEASON.to_string(), season);
        if let Some(mode) = &request.mode {
            resolution.shared.insert(keys::MODE.to_string(), mode.clone());
        }
        if let Some(category) = &request.category {
            resolution
                .shared
                .insert(keys::CATEGORY.to_string(), category.clone());
        }
        self.fill_deadline(request, &mut resolution.shared).await?;

        debug!(
            "Resolved {} recipient(s) for {} campaign",
            resolution.recipients.len(),
            request.kind
        );

        if request.test_mode {
            let address = request
                .test_address
                .as_deref()
                .map(str::trim)
                .filter(|a| EmailAddress::is_valid(a))
                .ok_or_else(|| {
                    DeliveryError::PreconditionNotMet(
                        "test mode requires a valid test address".to_string(),
                    )
                })?;
            resolution.recipients = vec![test_recipient(address, &resolution.recipients)];
        }

        Ok(resolution)
    }

    /// Give a tournament-bound request the mode and category of its tournament.
    ///
    /// The campaign record inherits these tags, which later reminders and
    /// the conflict check match on. An unknown tournament is left for
    /// `resolve` to report.
    pub async fn tag_with_tournament(&self, request: &mut CampaignRequest) -> Result<(), DeliveryError> {
        let Some(id) = request.tournament_id.filter(|_| request.kind.requires_tournament()) else {
            return Ok(());
        };
        if let Some(tournament) = self.stores.tournaments.get(id).await.map_err(lookup_err)? {
            request.mode = Some(tournament.mode);
            request.category = Some(tournament.category);
        }
        Ok(())
    }

    /// Derive the registration deadline from the event date unless one was supplied
    async fn fill_deadline(
        &self,
        request: &CampaignRequest,
        shared: &mut TemplateContext,
    ) -> Result<(), DeliveryError> {
        if request.context.contains_key(keys::DEADLINE) {
            return Ok(());
        }

        let mut event_date = request
            .context
            .get(keys::TOURNAMENT_DATE)
            .or_else(|| shared.get(keys::TOURNAMENT_DATE))
            .and_then(|raw| parse_date(raw));

        if event_date.is_none() {
            if let Some(id) = request.tournament_id {
                if let Some(tournament) = self.stores.tournaments.get(id).await.map_err(lookup_err)? {
                    event_date = Some(tournament.event_date);
                    shared.extend(tournament_context(&tournament));
                }
            }
        }

        if let Some(date) = event_date {
            shared.insert(keys::DEADLINE.to_string(), format_date(deadline_for(date)));
        }
        Ok(())
    }
}

fn lookup_err(e: tourneymail_common::Error) -> DeliveryError {
    DeliveryError::Resolution(e.to_string())
}

fn required_tags(request: &CampaignRequest) -> Result<(&str, &str), DeliveryError> {
    match (request.mode.as_deref(), request.category.as_deref()) {
        (Some(mode), Some(category)) => Ok((mode, category)),
        _ => Err(DeliveryError::PreconditionNotMet(format!(
            "{} campaign requires a mode and a category",
            request.kind
        ))),
    }
}

fn same_label(stored: Option<&str>, wanted: &str) -> bool {
    stored.is_some_and(|s| s.eq_ignore_ascii_case(wanted))
}

fn contact_context(contact: &Contact) -> TemplateContext {
    let mut context = TemplateContext::new();
    context.insert(keys::FIRST_NAME.to_string(), contact.first_name.clone());
    context.insert(keys::LAST_NAME.to_string(), contact.last_name.clone());
    context.insert(keys::PLAYER_NAME.to_string(), contact.display_name());
    context.insert(keys::CLUB.to_string(), contact.club.clone().unwrap_or_default());
    context.insert(keys::LICENCE.to_string(), contact.licence.clone());
    context
}

fn contact_recipient(contact: &Contact, email: Option<&str>) -> Recipient {
    let email = email
        .or(contact.email.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string();
    let mut context = contact_context(contact);
    context.insert(keys::EMAIL.to_string(), email.clone());

    Recipient {
        email,
        contact_id: Some(contact.id),
        name: contact.display_name(),
        context,
    }
}

fn tournament_context(tournament: &Tournament) -> TemplateContext {
    let mut context = TemplateContext::new();
    context.insert(keys::TOURNAMENT_NAME.to_string(), tournament.name.clone());
    context.insert(
        keys::TOURNAMENT_DATE.to_string(),
        format_date(tournament.event_date),
    );
    context.insert(
        keys::TOURNAMENT_PLACE.to_string(),
        tournament.location.clone().unwrap_or_default(),
    );
    context
}

fn test_recipient(address: &str, audience: &[Recipient]) -> Recipient {
    let mut recipient = match audience.first() {
        Some(first) => first.clone(),
        None => {
            let mut context = TemplateContext::new();
            context.insert(keys::FIRST_NAME.to_string(), "Test".to_string());
            context.insert(keys::LAST_NAME.to_string(), String::new());
            context.insert(keys::PLAYER_NAME.to_string(), "Test".to_string());
            context.insert(keys::CLUB.to_string(), String::new());
            context.insert(keys::LICENCE.to_string(), String::new());
            Recipient {
                email: String::new(),
                contact_id: None,
                name: "Test".to_string(),
                context,
            }
        }
    };

    recipient.email = address.to_string();
    recipient.contact_id = None;
    recipient
        .context
        .insert(keys::EMAIL.to_string(), address.to_string());
    recipient
}

async fn find_tournament(
    audience: &Audience<'_>,
    stage: &str,
    mode: &str,
    category: &str,
) -> Result<Option<Tournament>, DeliveryError> {
    let tournaments = &audience.stores.tournaments;
    match audience.request.tournament_id {
        Some(id) => match tournaments.get(id).await.map_err(lookup_err)? {
            Some(t) => Ok(Some(t)),
            None => Err(DeliveryError::PreconditionNotMet(format!(
                "Tournament {} not found",
                id
            ))),
        },
        None => tournaments
            .find_stage(audience.season, mode, category, stage)
            .await
            .map_err(lookup_err),
    }
}

/// `custom`: the explicit id list, or every ranked player of a mode/category
struct ExplicitList;

#[async_trait]
impl AudienceStrategy for ExplicitList {
    async fn resolve(&self, audience: &Audience<'_>) -> Result<Resolution, DeliveryError> {
        let request = audience.request;
        let contacts = if !request.recipient_ids.is_empty() {
            audience
                .stores
                .contacts
                .get_by_ids(&request.recipient_ids)
                .await
                .map_err(lookup_err)?
        } else if let (Some(mode), Some(category)) = (&request.mode, &request.category) {
            let filter = EligibilityFilter {
                season: audience.season.to_string(),
                mode: mode.clone(),
                category: category.clone(),
                exclude_registered_in: None,
            };
            audience
                .stores
                .contacts
                .list_eligible(&filter)
                .await
                .map_err(lookup_err)?
        } else {
            return Err(DeliveryError::PreconditionNotMet(
                "custom campaign has neither recipients nor a mode and category".to_string(),
            ));
        };

        Ok(Resolution {
            recipients: contacts.iter().map(|c| contact_recipient(c, None)).collect(),
            shared: TemplateContext::new(),
        })
    }
}

/// `relance_t2` / `relance_t3`: ranked players not yet registered for the stage
struct RegistrationReminder {
    stage: &'static str,
}

#[async_trait]
impl AudienceStrategy for RegistrationReminder {
    async fn resolve(&self, audience: &Audience<'_>) -> Result<Resolution, DeliveryError> {
        let (mode, category) = required_tags(audience.request)?;
        let target = find_tournament(audience, self.stage, mode, category).await?;

        let filter = EligibilityFilter {
            season: audience.season.to_string(),
            mode: mode.to_string(),
            category: category.to_string(),
            exclude_registered_in: target.as_ref().map(|t| t.id),
        };
        let contacts = audience
            .stores
            .contacts
            .list_eligible(&filter)
            .await
            .map_err(lookup_err)?;

        Ok(Resolution {
            recipients: contacts.iter().map(|c| contact_recipient(c, None)).collect(),
            shared: target.as_ref().map(tournament_context).unwrap_or_default(),
        })
    }
}

/// `relance_finale`: the qualified head of the season ranking.
///
/// Only allowed once the finale convocation went out for the same
/// mode and category.
struct FinaleReminder;

#[async_trait]
impl AudienceStrategy for FinaleReminder {
    async fn resolve(&self, audience: &Audience<'_>) -> Result<Resolution, DeliveryError> {
        let (mode, category) = required_tags(audience.request)?;
        let stores = audience.stores;

        let convocations = stores
            .records
            .list_delivered(CampaignKind::FinaleConvocation)
            .await
            .map_err(lookup_err)?;
        let convoked = convocations.iter().any(|r| {
            r.status_enum() == Some(CampaignRecordStatus::Completed)
                && same_label(r.mode.as_deref(), mode)
                && same_label(r.category.as_deref(), category)
        });
        if !convoked {
            return Err(DeliveryError::PreconditionNotMet(format!(
                "no finale convocation has been sent for {} {}",
                mode, category
            )));
        }

        let ranking = stores
            .rankings
            .season_ranking(audience.season, mode, category)
            .await
            .map_err(lookup_err)?;
        let qualified = qualified_count(ranking.len());
        let head: Vec<_> = ranking
            .into_iter()
            .filter(|e| e.rank_position >= 1 && e.rank_position as usize <= qualified)
            .collect();

        let licences: Vec<String> = head.iter().map(|e| e.licence.clone()).collect();
        let contacts: HashMap<String, Contact> = stores
            .contacts
            .get_by_licences(&licences)
            .await
            .map_err(lookup_err)?
            .into_iter()
            .map(|c| (c.licence.clone(), c))
            .collect();

        let recipients = head
            .iter()
            .filter_map(|entry| {
                let contact = contacts.get(&entry.licence)?;
                if !contact.email.as_deref().is_some_and(EmailAddress::is_valid) {
                    return None;
                }
                let mut recipient = contact_recipient(contact, None);
                recipient.context.insert(
                    keys::RANK_POSITION.to_string(),
                    entry.rank_position.to_string(),
                );
                recipient.context.insert(
                    keys::TOTAL_POINTS.to_string(),
                    entry.total_points.to_string(),
                );
                Some(recipient)
            })
            .collect();

        let mut shared = find_tournament(audience, "finale", mode, category)
            .await?
            .as_ref()
            .map(tournament_context)
            .unwrap_or_default();
        shared.insert(keys::QUALIFIED_COUNT.to_string(), qualified.to_string());

        Ok(Resolution { recipients, shared })
    }
}

/// `tournament_results` / `finale_convocation`: registered players of one event
struct TournamentAudience {
    finale_only: bool,
}

#[async_trait]
impl AudienceStrategy for TournamentAudience {
    async fn resolve(&self, audience: &Audience<'_>) -> Result<Resolution, DeliveryError> {
        let request = audience.request;
        let stores = audience.stores;

        let id = request.tournament_id.ok_or_else(|| {
            DeliveryError::PreconditionNotMet(format!(
                "{} campaign requires a tournament",
                request.kind
            ))
        })?;
        let tournament = stores
            .tournaments
            .get(id)
            .await
            .map_err(lookup_err)?
            .ok_or_else(|| DeliveryError::PreconditionNotMet(format!("Tournament {} not found", id)))?;
        if self.finale_only && !tournament.is_finale() {
            return Err(DeliveryError::PreconditionNotMet(format!(
                "{} is not a finale",
                tournament.name
            )));
        }

        let participants = stores.tournaments.participants(id).await.map_err(lookup_err)?;
        let licences: Vec<String> = participants.iter().map(|p| p.licence.clone()).collect();
        let contacts: HashMap<String, Contact> = stores
            .contacts
            .get_by_licences(&licences)
            .await
            .map_err(lookup_err)?
            .into_iter()
            .map(|c| (c.licence.clone(), c))
            .collect();

        let standings: HashMap<String, (i32, i32)> = if self.finale_only {
            stores
                .rankings
                .season_ranking(&tournament.season, &tournament.mode, &tournament.category)
                .await
                .map_err(lookup_err)?
                .into_iter()
                .map(|e| (e.licence, (e.rank_position, e.total_points)))
                .collect()
        } else {
            HashMap::new()
        };

        let recipients = participants
            .iter()
            .map(|participant| {
                // The registration address is more specific than the directory one
                let registered = participant
                    .email
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty());

                let mut recipient = match contacts.get(&participant.licence) {
                    Some(contact) => contact_recipient(contact, registered),
                    None => {
                        let email = registered.unwrap_or_default().to_string();
                        let mut context = TemplateContext::new();
                        context.insert(keys::LICENCE.to_string(), participant.licence.clone());
                        context.insert(keys::EMAIL.to_string(), email.clone());
                        Recipient {
                            email,
                            contact_id: None,
                            name: participant.licence.clone(),
                            context,
                        }
                    }
                };

                if let Some(position) = participant.final_position {
                    recipient
                        .context
                        .insert(keys::FINAL_POSITION.to_string(), position.to_string());
                }
                if let Some(points) = participant.points {
                    recipient
                        .context
                        .insert(keys::POINTS.to_string(), points.to_string());
                }
                if let Some((rank, total)) = standings.get(&participant.licence) {
                    recipient
                        .context
                        .insert(keys::RANK_POSITION.to_string(), rank.to_string());
                    recipient
                        .context
                        .insert(keys::TOTAL_POINTS.to_string(), total.to_string());
                }
                recipient
            })
            .collect();

        let mut shared = tournament_context(&tournament);
        shared.insert(keys::MODE.to_string(), tournament.mode.clone());
        shared.insert(keys::CATEGORY.to_string(), tournament.category.clone());

        Ok(Resolution { recipients, shared })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduled::test_support::*;
    use pretty_assertions::assert_eq;
    use tourneymail_storage::CampaignRecordRepository;

    fn resolver(store: &MemoryStore) -> RecipientResolver {
        RecipientResolver::new(AudienceStores::from_memory(store), fixed_clock(), "Ligue")
    }

    fn emails(resolution: &Resolution) -> Vec<String> {
        let mut emails: Vec<String> = resolution.recipients.iter().map(|r| r.email.clone()).collect();
        emails.sort();
        emails
    }

    #[test]
    fn test_qualified_count_threshold() {
        assert_eq!(qualified_count(0), 4);
        assert_eq!(qualified_count(8), 4);
        assert_eq!(qualified_count(9), 6);
        assert_eq!(qualified_count(20), 6);
    }

    #[tokio::test]
    async fn test_custom_uses_explicit_ids() {
        let store = MemoryStore::new();
        let jean = contact("L1", "Jean", Some("jean@example.org"));
        let marie = contact("L2", "Marie", Some("marie@example.org"));
        store.insert_contact(jean.clone()).await;
        store.insert_contact(marie).await;

        let mut req = request(CampaignKind::Custom);
        req.recipient_ids = vec![jean.id];

        let resolution = resolver(&store).resolve(&req).await.unwrap();
        assert_eq!(emails(&resolution), vec!["jean@example.org"]);
        assert_eq!(resolution.recipients[0].contact_id, Some(jean.id));
        assert_eq!(resolution.recipients[0].context["first_name"], "Jean");
    }

    #[tokio::test]
    async fn test_custom_without_audience_is_precondition() {
        let store = MemoryStore::new();
        let req = request(CampaignKind::Custom);

        let err = resolver(&store).resolve(&req).await.unwrap_err();
        assert!(matches!(err, DeliveryError::PreconditionNotMet(_)));
    }

    #[tokio::test]
    async fn test_reminder_excludes_registered_players() {
        let store = MemoryStore::new();
        let jean = contact("L1", "Jean", Some("jean@example.org"));
        let marie = contact("L2", "Marie", Some("marie@example.org"));
        store.insert_contact(jean).await;
        store.insert_contact(marie).await;
        store.insert_ranking(ranking("L1", 1, 120)).await;
        store.insert_ranking(ranking("L2", 2, 100)).await;

        let t2 = tournament("t2", date(2025, 6, 20));
        store.insert_tournament(t2.clone()).await;
        store.insert_participant(participant(t2.id, "L2", None)).await;

        let mut req = request(CampaignKind::RelanceT2);
        req.mode = Some("libre".to_string());
        req.category = Some("R1".to_string());

        let resolution = resolver(&store).resolve(&req).await.unwrap();
        assert_eq!(emails(&resolution), vec!["jean@example.org"]);
        assert_eq!(resolution.shared["tournament_date"], "20/06/2025");
        assert_eq!(resolution.shared["deadline"], "13/06/2025");
        assert_eq!(resolution.shared["season"], "2024-2025");
    }

    #[tokio::test]
    async fn test_reminder_requires_mode_and_category() {
        let store = MemoryStore::new();
        let err = resolver(&store)
            .resolve(&request(CampaignKind::RelanceT3))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::PreconditionNotMet(_)));
    }

    #[tokio::test]
    async fn test_deadline_from_supplied_event_date() {
        let store = MemoryStore::new();
        store
            .insert_contact(contact("L1", "Jean", Some("jean@example.org")))
            .await;
        store.insert_ranking(ranking("L1", 1, 120)).await;

        let mut req = request(CampaignKind::RelanceT3);
        req.mode = Some("libre".to_string());
        req.category = Some("R1".to_string());
        req.context
            .insert("tournament_date".to_string(), "2025-06-20".to_string());

        let resolution = resolver(&store).resolve(&req).await.unwrap();
        assert_eq!(resolution.shared["deadline"], "13/06/2025");
    }

    #[tokio::test]
    async fn test_finale_reminder_requires_convocation() {
        let store = MemoryStore::new();
        let mut req = request(CampaignKind::RelanceFinale);
        req.mode = Some("libre".to_string());
        req.category = Some("R1".to_string());

        let err = resolver(&store).resolve(&req).await.unwrap_err();
        assert!(matches!(err, DeliveryError::PreconditionNotMet(_)));

        // A test-mode convocation does not count
        CampaignRecordRepository::create(&store, record(CampaignKind::FinaleConvocation, true))
            .await
            .unwrap();
        let err = resolver(&store).resolve(&req).await.unwrap_err();
        assert!(matches!(err, DeliveryError::PreconditionNotMet(_)));
    }

    #[tokio::test]
    async fn test_finale_reminder_keeps_qualified_with_address() {
        let store = MemoryStore::new();
        CampaignRecordRepository::create(&store, record(CampaignKind::FinaleConvocation, false))
            .await
            .unwrap();

        // 8 ranked players: the top 4 qualify
        for rank in 1..=8 {
            let licence = format!("L{}", rank);
            let email = (rank != 2).then(|| format!("p{}@example.org", rank));
            store
                .insert_contact(contact(&licence, &format!("P{}", rank), email.as_deref()))
                .await;
            store.insert_ranking(ranking(&licence, rank, 200 - rank * 10)).await;
        }

        let mut req = request(CampaignKind::RelanceFinale);
        req.mode = Some("LIBRE".to_string());
        req.category = Some("r1".to_string());

        let resolution = resolver(&store).resolve(&req).await.unwrap();
        assert_eq!(
            emails(&resolution),
            vec!["p1@example.org", "p3@example.org", "p4@example.org"]
        );
        assert_eq!(resolution.shared["qualified_count"], "4");
        let third = resolution
            .recipients
            .iter()
            .find(|r| r.email == "p3@example.org")
            .unwrap();
        assert_eq!(third.context["rank_position"], "3");
        assert_eq!(third.context["total_points"], "170");
    }

    #[tokio::test]
    async fn test_results_prefer_registration_address() {
        let store = MemoryStore::new();
        store
            .insert_contact(contact("L1", "Jean", Some("jean@example.org")))
            .await;
        store
            .insert_contact(contact("L2", "Marie", Some("marie@example.org")))
            .await;
        let t1 = tournament("t1", date(2024, 11, 10));
        store.insert_tournament(t1.clone()).await;
        store
            .insert_participant(participant(t1.id, "L1", Some("jean.club@example.org")))
            .await;
        store.insert_participant(participant(t1.id, "L2", None)).await;

        let mut req = request(CampaignKind::TournamentResults);
        req.tournament_id = Some(t1.id);

        let resolution = resolver(&store).resolve(&req).await.unwrap();
        assert_eq!(
            emails(&resolution),
            vec!["jean.club@example.org", "marie@example.org"]
        );
        assert_eq!(resolution.shared["tournament_name"], t1.name);
    }

    #[tokio::test]
    async fn test_tournament_tags_copied_onto_request() {
        let store = MemoryStore::new();
        let finale = tournament("finale", date(2025, 6, 14));
        store.insert_tournament(finale.clone()).await;

        let mut req = request(CampaignKind::FinaleConvocation);
        req.tournament_id = Some(finale.id);
        resolver(&store).tag_with_tournament(&mut req).await.unwrap();
        assert_eq!(req.mode.as_deref(), Some("libre"));
        assert_eq!(req.category.as_deref(), Some("R1"));

        // Reminders keep the tags the operator chose
        let mut reminder = request(CampaignKind::RelanceT2);
        reminder.tournament_id = Some(finale.id);
        resolver(&store).tag_with_tournament(&mut reminder).await.unwrap();
        assert_eq!(reminder.mode, None);
    }

    #[tokio::test]
    async fn test_convocation_requires_finale() {
        let store = MemoryStore::new();
        let t1 = tournament("t1", date(2024, 11, 10));
        store.insert_tournament(t1.clone()).await;

        let mut req = request(CampaignKind::FinaleConvocation);
        req.tournament_id = Some(t1.id);

        let err = resolver(&store).resolve(&req).await.unwrap_err();
        assert!(matches!(err, DeliveryError::PreconditionNotMet(_)));
    }

    #[tokio::test]
    async fn test_test_mode_replaces_audience() {
        let store = MemoryStore::new();
        let jean = contact("L1", "Jean", Some("jean@example.org"));
        let marie = contact("L2", "Marie", Some("marie@example.org"));
        store.insert_contact(jean.clone()).await;
        store.insert_contact(marie.clone()).await;

        let mut req = request(CampaignKind::Custom);
        req.recipient_ids = vec![jean.id, marie.id];
        req.test_mode = true;
        req.test_address = Some(" operator@example.org ".to_string());

        let resolution = resolver(&store).resolve(&req).await.unwrap();
        assert_eq!(resolution.recipients.len(), 1);
        let only = &resolution.recipients[0];
        assert_eq!(only.email, "operator@example.org");
        assert_eq!(only.contact_id, None);
        assert!(only.context.contains_key("first_name"));
    }

    #[tokio::test]
    async fn test_test_mode_requires_address() {
        let store = MemoryStore::new();
        let jean = contact("L1", "Jean", Some("jean@example.org"));
        store.insert_contact(jean.clone()).await;

        let mut req = request(CampaignKind::Custom);
        req.recipient_ids = vec![jean.id];
        req.test_mode = true;

        let err = resolver(&store).resolve(&req).await.unwrap_err();
        assert!(matches!(err, DeliveryError::PreconditionNotMet(_)));
    }
}
