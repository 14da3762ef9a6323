//! Scheduled Campaign Module - Queue polling and campaign delivery

mod clock;
mod error;
mod guard;
mod manager;
mod pipeline;
mod recorder;
mod request;
mod resolver;
mod scheduler;
mod template;
mod throttler;
mod transport;

#[cfg(test)]
mod test_support;

pub use clock::{season_of, Clock, OrganizationClock};
pub use error::{DeliveryError, SendError};
pub use guard::ConflictGuard;
pub use manager::{CampaignError, CampaignManager};
pub use pipeline::DeliveryPipeline;
pub use recorder::AuditRecorder;
pub use request::{CampaignRequest, ManualCampaign};
pub use resolver::{qualified_count, AudienceStores, Recipient, RecipientResolver, Resolution};
pub use scheduler::{CampaignScheduler, ItemOutcome, ItemReport, TickReport, TickStatus};
pub use template::{MessageContent, TemplateContext, TemplateRenderer};
pub use throttler::{
    DeliveryReport, DeliverySettings, DeliveryThrottler, OutboundMessage, RecipientOutcome,
};
pub use transport::{Envelope, LogMailer, Mailer, SmtpMailer};
