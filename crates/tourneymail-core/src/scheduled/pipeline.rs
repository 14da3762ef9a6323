//! Delivery Pipeline - Resolve, render and send one campaign

use std::sync::Arc;
use tourneymail_storage::ScheduledCampaignRepository;

use super::clock::Clock;
use super::error::DeliveryError;
use super::guard::ConflictGuard;
use super::recorder::AuditRecorder;
use super::request::CampaignRequest;
use super::resolver::{AudienceStores, RecipientResolver};
use super::template::TemplateRenderer;
use super::throttler::{DeliverySettings, DeliveryThrottler, OutboundMessage};
use super::transport::Mailer;

/// The stages shared by scheduled and on-demand sends
pub struct DeliveryPipeline {
    guard: ConflictGuard,
    resolver: RecipientResolver,
    renderer: TemplateRenderer,
    throttler: DeliveryThrottler,
    recorder: AuditRecorder,
}

impl DeliveryPipeline {
    pub fn new(
        stores: AudienceStores,
        scheduled: Arc<dyn ScheduledCampaignRepository>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        settings: DeliverySettings,
    ) -> Self {
        let organization = settings.organization.clone();
        Self {
            guard: ConflictGuard::new(stores.records.clone()),
            throttler: DeliveryThrottler::new(mailer, stores.contacts.clone(), clock.clone(), settings),
            recorder: AuditRecorder::new(scheduled, stores.records.clone()),
            resolver: RecipientResolver::new(stores, clock, organization),
            renderer: TemplateRenderer::new(),
        }
    }

    pub fn guard(&self) -> &ConflictGuard {
        &self.guard
    }

    pub fn throttler(&self) -> &DeliveryThrottler {
        &self.throttler
    }

    pub fn recorder(&self) -> &AuditRecorder {
        &self.recorder
    }

    /// Fail fast when the outbound transport cannot be reached
    pub async fn check_transport(&self) -> Result<(), DeliveryError> {
        self.throttler
            .mailer()
            .check_available()
            .await
            .map_err(|e| DeliveryError::TransportUnavailable(e.to_string()))
    }

    /// Stamp a tournament-bound request with its tournament's mode and category
    pub async fn tag_audience(&self, request: &mut CampaignRequest) -> Result<(), DeliveryError> {
        self.resolver.tag_with_tournament(request).await
    }

    /// Resolve the audience and render one message per recipient.
    ///
    /// Placeholders see the shared values first, then the campaign's own
    /// context, then the recipient's fields.
    pub async fn prepare(&self, request: &CampaignRequest) -> Result<Vec<OutboundMessage>, DeliveryError> {
        let resolution = self.resolver.resolve(request).await?;
        let content = request.content();

        let messages = resolution
            .recipients
            .into_iter()
            .map(|recipient| {
                let mut context = resolution.shared.clone();
                context.extend(request.context.iter().map(|(k, v)| (k.clone(), v.clone())));
                context.extend(recipient.context.iter().map(|(k, v)| (k.clone(), v.clone())));

                OutboundMessage {
                    content: self.renderer.render_content(&content, &context),
                    recipient,
                }
            })
            .collect();

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduled::test_support::*;
    use pretty_assertions::assert_eq;
    use tourneymail_common::types::CampaignKind;
    use tourneymail_storage::MemoryStore;

    #[tokio::test]
    async fn test_prepare_renders_each_recipient() {
        let store = MemoryStore::new();
        let jean = contact("L1", "Jean", Some("jean@example.org"));
        store.insert_contact(jean.clone()).await;
        let pipeline = pipeline(&store, Arc::new(RecordingMailer::new()));

        let mut req = request(CampaignKind::Custom);
        req.recipient_ids = vec![jean.id];
        req.subject = "{organization} : saison {season}".to_string();
        req.body = "Bonjour {first_name}, rendez-vous à {lieu}".to_string();
        req.context.insert("lieu".to_string(), "Lyon".to_string());

        let messages = pipeline.prepare(&req).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.subject, "Ligue : saison 2024-2025");
        assert_eq!(messages[0].content.body, "Bonjour Jean, rendez-vous à Lyon");
    }

    #[tokio::test]
    async fn test_custom_context_overrides_computed_values() {
        let store = MemoryStore::new();
        let jean = contact("L1", "Jean", Some("jean@example.org"));
        store.insert_contact(jean.clone()).await;
        let pipeline = pipeline(&store, Arc::new(RecordingMailer::new()));

        let mut req = request(CampaignKind::Custom);
        req.recipient_ids = vec![jean.id];
        req.body = "{season} / {deadline}".to_string();
        req.context.insert("season".to_string(), "2023-2024".to_string());
        req.context.insert("deadline".to_string(), "01/06/2025".to_string());

        let messages = pipeline.prepare(&req).await.unwrap();
        assert_eq!(messages[0].content.body, "2023-2024 / 01/06/2025");
    }

    #[tokio::test]
    async fn test_check_transport_maps_unavailable() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::new());
        mailer.set_available(false);
        let pipeline = pipeline(&store, mailer);

        assert!(matches!(
            pipeline.check_transport().await,
            Err(DeliveryError::TransportUnavailable(_))
        ));
    }
}
