//! TourneyMail Core - Scheduled campaign delivery
//!
//! This crate turns queued campaign requests into resolved recipients,
//! rendered content and throttled sends, and records the outcome so that
//! automatic sends never repeat a manual one.

pub mod scheduled;

pub use scheduled::{
    AudienceStores, AuditRecorder, CampaignError, CampaignManager, CampaignRequest,
    CampaignScheduler, Clock, ConflictGuard, DeliveryError, DeliveryPipeline, DeliveryReport,
    DeliverySettings, DeliveryThrottler, Envelope, ItemOutcome, LogMailer, Mailer,
    ManualCampaign, OrganizationClock, Recipient, RecipientOutcome, RecipientResolver,
    SendError, SmtpMailer, TemplateContext, TemplateRenderer, TickReport, TickStatus,
};
