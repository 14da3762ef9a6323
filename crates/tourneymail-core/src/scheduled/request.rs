//! Campaign requests, scheduled or sent on demand

use serde::{Deserialize, Serialize};
use tourneymail_common::types::{
    CampaignKind, ContactId, EmailAddress, ScheduledCampaignId, TournamentId,
};
use tourneymail_storage::{context_pairs, NewScheduledCampaign, ScheduledCampaign};

use super::error::DeliveryError;
use super::template::{MessageContent, TemplateContext};

/// Everything the delivery pipeline needs to know about one campaign
#[derive(Debug, Clone)]
pub struct CampaignRequest {
    pub kind: CampaignKind,
    pub subject: String,
    pub body: String,
    pub outro: Option<String>,
    pub image_url: Option<String>,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub tournament_id: Option<TournamentId>,
    pub recipient_ids: Vec<ContactId>,
    pub context: TemplateContext,
    pub test_mode: bool,
    pub test_address: Option<String>,
    pub cc_address: Option<String>,
    /// Set when the request comes from the schedule queue
    pub scheduled_campaign_id: Option<ScheduledCampaignId>,
}

impl CampaignRequest {
    pub fn from_item(item: &ScheduledCampaign) -> Result<Self, DeliveryError> {
        let kind = item.kind().map_err(DeliveryError::Resolution)?;

        Ok(Self {
            kind,
            subject: item.subject.clone(),
            body: item.body.clone(),
            outro: item.outro.clone(),
            image_url: item.image_url.clone(),
            mode: item.mode.clone(),
            category: item.category.clone(),
            tournament_id: item.tournament_id,
            recipient_ids: item.recipient_ids.clone(),
            context: item.context_pairs().into_iter().collect(),
            test_mode: item.test_mode,
            test_address: item.test_address.clone(),
            cc_address: item.cc_address.clone(),
            scheduled_campaign_id: Some(item.id),
        })
    }

    /// Check the fields every campaign of this kind needs
    pub fn validate(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() {
            return Err("subject is required".to_string());
        }
        if self.body.trim().is_empty() {
            return Err("body is required".to_string());
        }
        if self.kind.requires_mode_and_category() && (self.mode.is_none() || self.category.is_none()) {
            return Err(format!("{} requires a mode and a category", self.kind));
        }
        if self.kind.requires_tournament() && self.tournament_id.is_none() {
            return Err(format!("{} requires a tournament", self.kind));
        }
        if self.kind == CampaignKind::Custom
            && self.recipient_ids.is_empty()
            && (self.mode.is_none() || self.category.is_none())
        {
            return Err("custom requires recipients or a mode and a category".to_string());
        }
        if self.test_mode
            && !self
                .test_address
                .as_deref()
                .is_some_and(EmailAddress::is_valid)
        {
            return Err("test mode requires a valid test address".to_string());
        }
        if let Some(cc) = &self.cc_address {
            if !EmailAddress::is_valid(cc) {
                return Err(format!("invalid cc address '{}'", cc));
            }
        }
        Ok(())
    }

    pub fn content(&self) -> MessageContent {
        MessageContent {
            subject: self.subject.clone(),
            body: self.body.clone(),
            outro: self.outro.clone(),
        }
    }
}

impl From<&NewScheduledCampaign> for CampaignRequest {
    fn from(input: &NewScheduledCampaign) -> Self {
        Self {
            kind: input.campaign_kind,
            subject: input.subject.clone(),
            body: input.body.clone(),
            outro: input.outro.clone(),
            image_url: input.image_url.clone(),
            mode: input.mode.clone(),
            category: input.category.clone(),
            tournament_id: input.tournament_id,
            recipient_ids: input.recipient_ids.clone(),
            context: input
                .context
                .as_ref()
                .map(|c| context_pairs(c).into_iter().collect())
                .unwrap_or_default(),
            test_mode: input.test_mode,
            test_address: input.test_address.clone(),
            cc_address: input.cc_address.clone(),
            scheduled_campaign_id: None,
        }
    }
}

/// A campaign sent immediately by an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualCampaign {
    pub campaign_kind: CampaignKind,
    pub subject: String,
    pub body: String,
    pub outro: Option<String>,
    pub image_url: Option<String>,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub tournament_id: Option<TournamentId>,
    #[serde(default)]
    pub recipient_ids: Vec<ContactId>,
    #[serde(default)]
    pub context: TemplateContext,
    #[serde(default)]
    pub test_mode: bool,
    pub test_address: Option<String>,
    pub cc_address: Option<String>,
}

impl From<ManualCampaign> for CampaignRequest {
    fn from(manual: ManualCampaign) -> Self {
        Self {
            kind: manual.campaign_kind,
            subject: manual.subject,
            body: manual.body,
            outro: manual.outro,
            image_url: manual.image_url,
            mode: manual.mode,
            category: manual.category,
            tournament_id: manual.tournament_id,
            recipient_ids: manual.recipient_ids,
            context: manual.context,
            test_mode: manual.test_mode,
            test_address: manual.test_address,
            cc_address: manual.cc_address,
            scheduled_campaign_id: None,
        }
    }
}
