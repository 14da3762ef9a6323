//! Common types for TourneyMail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for scheduled campaign items
pub type ScheduledCampaignId = Uuid;

/// Unique identifier for campaign records
pub type CampaignRecordId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for tournaments and finales
pub type TournamentId = Uuid;

/// Attribution stored on campaign records produced by the scheduler
pub const SCHEDULED_ATTRIBUTION: &str = "scheduled";

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    ///
    /// Accepts `local@domain.tld` with no whitespace and a dotted domain
    /// whose labels are all non-empty.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.chars().any(char::is_whitespace) {
            return None;
        }

        let (local, domain) = s.rsplit_once('@')?;
        if local.is_empty() || local.contains('@') || domain.is_empty() {
            return None;
        }
        if !domain.contains('.') || domain.split('.').any(str::is_empty) {
            return None;
        }

        Some(Self::new(local, domain))
    }

    /// Whether the string is a syntactically usable address
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_some()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// Campaign kinds
///
/// Each kind is bound to one audience resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Custom,
    RelanceT2,
    RelanceT3,
    RelanceFinale,
    TournamentResults,
    FinaleConvocation,
}

impl CampaignKind {
    /// All kinds, in declaration order
    pub const ALL: [CampaignKind; 6] = [
        CampaignKind::Custom,
        CampaignKind::RelanceT2,
        CampaignKind::RelanceT3,
        CampaignKind::RelanceFinale,
        CampaignKind::TournamentResults,
        CampaignKind::FinaleConvocation,
    ];

    /// Kinds whose audience is defined by a specific tournament or finale
    pub fn requires_tournament(&self) -> bool {
        matches!(
            self,
            CampaignKind::TournamentResults | CampaignKind::FinaleConvocation
        )
    }

    /// Kinds that target a mode/category pair
    pub fn requires_mode_and_category(&self) -> bool {
        matches!(
            self,
            CampaignKind::RelanceT2 | CampaignKind::RelanceT3 | CampaignKind::RelanceFinale
        )
    }
}

impl std::fmt::Display for CampaignKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignKind::Custom => write!(f, "custom"),
            CampaignKind::RelanceT2 => write!(f, "relance_t2"),
            CampaignKind::RelanceT3 => write!(f, "relance_t3"),
            CampaignKind::RelanceFinale => write!(f, "relance_finale"),
            CampaignKind::TournamentResults => write!(f, "tournament_results"),
            CampaignKind::FinaleConvocation => write!(f, "finale_convocation"),
        }
    }
}

impl std::str::FromStr for CampaignKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custom" => Ok(CampaignKind::Custom),
            "relance_t2" => Ok(CampaignKind::RelanceT2),
            "relance_t3" => Ok(CampaignKind::RelanceT3),
            "relance_finale" => Ok(CampaignKind::RelanceFinale),
            "tournament_results" => Ok(CampaignKind::TournamentResults),
            "finale_convocation" => Ok(CampaignKind::FinaleConvocation),
            _ => Err(format!("Invalid campaign kind: {}", s)),
        }
    }
}

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("joueur@club-billard.fr").unwrap();
        assert_eq!(email.local, "joueur");
        assert_eq!(email.domain, "club-billard.fr");
        assert_eq!(email.to_string(), "joueur@club-billard.fr");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
        assert!(EmailAddress::parse("user@localhost").is_none());
        assert!(EmailAddress::parse("user@example..com").is_none());
        assert!(EmailAddress::parse("us er@example.com").is_none());
        assert!(EmailAddress::parse("a@b@example.com").is_none());
    }

    #[test]
    fn test_campaign_kind_roundtrip() {
        for kind in CampaignKind::ALL {
            assert_eq!(kind.to_string().parse::<CampaignKind>(), Ok(kind));
        }
        assert!("relance".parse::<CampaignKind>().is_err());
    }

    #[test]
    fn test_campaign_kind_requirements() {
        assert!(CampaignKind::TournamentResults.requires_tournament());
        assert!(!CampaignKind::RelanceFinale.requires_tournament());
        assert!(CampaignKind::RelanceFinale.requires_mode_and_category());
        assert!(!CampaignKind::Custom.requires_mode_and_category());
    }
}
