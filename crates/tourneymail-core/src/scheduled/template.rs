//! Template Renderer - Placeholder substitution for campaign content

use chrono::{Duration, NaiveDate};
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Values available to `{name}` placeholders
pub type TemplateContext = HashMap<String, String>;

/// Context keys filled by the engine
pub mod keys {
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const PLAYER_NAME: &str = "player_name";
    pub const CLUB: &str = "club";
    pub const EMAIL: &str = "email";
    pub const LICENCE: &str = "licence";
    pub const RANK_POSITION: &str = "rank_position";
    pub const TOTAL_POINTS: &str = "total_points";
    pub const FINAL_POSITION: &str = "final_position";
    pub const POINTS: &str = "points";
    pub const QUALIFIED_COUNT: &str = "qualified_count";
    pub const SEASON: &str = "season";
    pub const MODE: &str = "mode";
    pub const CATEGORY: &str = "category";
    pub const TOURNAMENT_NAME: &str = "tournament_name";
    pub const TOURNAMENT_DATE: &str = "tournament_date";
    pub const TOURNAMENT_PLACE: &str = "tournament_place";
    pub const DEADLINE: &str = "deadline";
    pub const ORGANIZATION: &str = "organization";
}

/// Registration closes this many days before the event
pub const DEADLINE_DAYS_BEFORE_EVENT: i64 = 7;

/// Subject, body and closing text of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub subject: String,
    pub body: String,
    pub outro: Option<String>,
}

/// Template renderer for personalizing campaign content
pub struct TemplateRenderer {
    placeholder: Regex,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            placeholder: Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")
                .expect("placeholder pattern is a valid regex"),
        }
    }

    /// Replace every `{name}` with its context value; unknown names become empty
    pub fn render(&self, template: &str, context: &TemplateContext) -> String {
        self.placeholder
            .replace_all(template, |caps: &Captures| {
                context.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }

    /// Render subject, body and outro against the same context
    pub fn render_content(&self, content: &MessageContent, context: &TemplateContext) -> MessageContent {
        MessageContent {
            subject: self.render(&content.subject, context),
            body: self.render(&content.body, context),
            outro: content.outro.as_deref().map(|o| self.render(o, context)),
        }
    }
}

/// Parse a date given as `YYYY-MM-DD` or `DD/MM/YYYY`
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

/// Date as shown to players
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Registration deadline for an event on `event_date`
pub fn deadline_for(event_date: NaiveDate) -> NaiveDate {
    event_date - Duration::days(DEADLINE_DAYS_BEFORE_EVENT)
}
