//! Delivery Throttler - Sequential, paced sends with per-recipient outcomes

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tourneymail_common::types::EmailAddress;
use tourneymail_common::Config;
use tourneymail_storage::ContactRepository;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::request::CampaignRequest;
use super::resolver::Recipient;
use super::template::MessageContent;
use super::transport::{Envelope, Mailer};

/// Pacing and reporting settings
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Pause between two consecutive external calls
    pub send_delay: Duration,
    /// Receives a summary after each real batch
    pub supervisor_address: Option<String>,
    pub organization: String,
}

impl DeliverySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            send_delay: Duration::from_millis(config.scheduler.send_delay_ms),
            supervisor_address: config.delivery.supervisor_address.clone(),
            organization: config.organization.name.clone(),
        }
    }
}

/// Rendered content for one recipient
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub recipient: Recipient,
    pub content: MessageContent,
}

/// What happened to one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecipientOutcome {
    Sent { email: String, message_id: String },
    Failed { email: String, reason: String },
    /// The address was unusable; no send was attempted
    Skipped { email: String, reason: String },
}

/// Counters and outcomes of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
    pub outcomes: Vec<RecipientOutcome>,
}

/// Sends a batch one message at a time
pub struct DeliveryThrottler {
    mailer: Arc<dyn Mailer>,
    contacts: Arc<dyn ContactRepository>,
    clock: Arc<dyn Clock>,
    settings: DeliverySettings,
}

impl DeliveryThrottler {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        contacts: Arc<dyn ContactRepository>,
        clock: Arc<dyn Clock>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            mailer,
            contacts,
            clock,
            settings,
        }
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    /// Deliver every message of the batch.
    ///
    /// A failed send is recorded and the batch continues. Consecutive
    /// external calls are separated by the configured delay.
    pub async fn deliver(&self, request: &CampaignRequest, batch: &[OutboundMessage]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut calls = 0usize;

        for message in batch {
            let email = message.recipient.email.clone();

            if !EmailAddress::is_valid(&email) {
                debug!("Skipping unusable address '{}'", email);
                report.skipped += 1;
                report.outcomes.push(RecipientOutcome::Skipped {
                    email,
                    reason: "invalid address".to_string(),
                });
                continue;
            }

            self.pace(&mut calls).await;

            let envelope = compose(request, message);
            match self.mailer.send(&envelope).await {
                Ok(message_id) => {
                    debug!("Sent to {} ({})", email, message_id);
                    report.sent += 1;
                    report
                        .outcomes
                        .push(RecipientOutcome::Sent { email, message_id });

                    if let Some(contact_id) = message.recipient.contact_id {
                        if let Err(e) = self
                            .contacts
                            .mark_contacted(contact_id, self.clock.now_utc())
                            .await
                        {
                            warn!("Failed to stamp last contact for {}: {}", contact_id, e);
                        }
                    }
                }
                Err(e) => {
                    warn!("Send to {} failed: {}", email, e);
                    report.failed += 1;
                    report.outcomes.push(RecipientOutcome::Failed {
                        email,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !request.test_mode && report.sent > 0 {
            if let Some(supervisor) = self.settings.supervisor_address.clone() {
                self.pace(&mut calls).await;
                self.send_summary(&supervisor, request, batch.len(), &report)
                    .await;
            }
        }

        info!(
            "Batch for {} campaign done: {} sent, {} failed, {} skipped",
            request.kind, report.sent, report.failed, report.skipped
        );
        report
    }

    async fn pace(&self, calls: &mut usize) {
        if *calls > 0 && !self.settings.send_delay.is_zero() {
            tokio::time::sleep(self.settings.send_delay).await;
        }
        *calls += 1;
    }

    async fn send_summary(
        &self,
        supervisor: &str,
        request: &CampaignRequest,
        total: usize,
        report: &DeliveryReport,
    ) {
        let mut lines = vec![
            format!("Campagne : {} ({})", request.subject, request.kind),
            format!("Destinataires : {}", total),
            format!("Envoyés : {}", report.sent),
            format!("Échecs : {}", report.failed),
            format!("Ignorés : {}", report.skipped),
        ];
        if let (Some(mode), Some(category)) = (&request.mode, &request.category) {
            lines.push(format!("Catégorie : {} {}", mode, category));
        }
        for outcome in &report.outcomes {
            match outcome {
                RecipientOutcome::Failed { email, reason } => {
                    lines.push(format!("  échec {} : {}", email, reason))
                }
                RecipientOutcome::Skipped { email, reason } => {
                    lines.push(format!("  ignoré '{}' : {}", email, reason))
                }
                RecipientOutcome::Sent { .. } => {}
            }
        }

        let envelope = Envelope {
            to: supervisor.to_string(),
            cc: None,
            subject: format!(
                "[{}] Rapport d'envoi : {}",
                self.settings.organization, request.subject
            ),
            text_body: lines.join("\n"),
        };

        if let Err(e) = self.mailer.send(&envelope).await {
            warn!("Failed to send delivery summary to {}: {}", supervisor, e);
        }
    }
}

/// Assemble the message body: text, closing text, then the image
fn compose(request: &CampaignRequest, message: &OutboundMessage) -> Envelope {
    let content = &message.content;

    let mut text = content.body.clone();
    if let Some(outro) = content.outro.as_deref().filter(|o| !o.trim().is_empty()) {
        text.push_str("\n\n");
        text.push_str(outro);
    }

    if let Some(url) = &request.image_url {
        text.push_str("\n\n");
        text.push_str(url);
    }

    Envelope {
        to: message.recipient.email.clone(),
        // Test sends go to the operator only
        cc: if request.test_mode {
            None
        } else {
            request.cc_address.clone()
        },
        subject: content.subject.clone(),
        text_body: text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduled::test_support::*;
    use pretty_assertions::assert_eq;
    use tourneymail_common::types::CampaignKind;
    use tourneymail_storage::MemoryStore;

    fn throttler(
        mailer: &Arc<RecordingMailer>,
        store: &MemoryStore,
        supervisor: Option<&str>,
    ) -> DeliveryThrottler {
        DeliveryThrottler::new(
            mailer.clone(),
            Arc::new(store.clone()),
            fixed_clock(),
            DeliverySettings {
                send_delay: Duration::from_millis(1500),
                supervisor_address: supervisor.map(str::to_string),
                organization: "Ligue".to_string(),
            },
        )
    }

    fn outbound(email: &str) -> OutboundMessage {
        OutboundMessage {
            recipient: Recipient {
                email: email.to_string(),
                contact_id: None,
                name: email.to_string(),
                context: Default::default(),
            },
            content: MessageContent {
                subject: "Sujet".to_string(),
                body: "Corps".to_string(),
                outro: Some("Cordialement".to_string()),
            },
        }
    }

    fn batch(n: usize) -> Vec<OutboundMessage> {
        (1..=n).map(|i| outbound(&format!("p{}@example.org", i))).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_stop_batch() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::failing_for(&["p3@example.org"]));
        let throttler = throttler(&mailer, &store, None);

        let report = throttler
            .deliver(&request(CampaignKind::Custom), &batch(5))
            .await;

        assert_eq!(report.sent, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(mailer.sent_to().len(), 5);
        assert!(matches!(
            &report.outcomes[2],
            RecipientOutcome::Failed { email, .. } if email == "p3@example.org"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_sends_only() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::new());
        let throttler = throttler(&mailer, &store, None);

        let start = tokio::time::Instant::now();
        throttler
            .deliver(&request(CampaignKind::Custom), &batch(3))
            .await;

        let calls = mailer.call_times();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0] - start, Duration::ZERO);
        assert!(calls[1] - calls[0] >= Duration::from_millis(1500));
        assert!(calls[2] - calls[1] >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_is_skipped_without_call() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::new());
        let throttler = throttler(&mailer, &store, None);

        let messages = vec![outbound("p1@example.org"), outbound(""), outbound("p2@")];
        let report = throttler
            .deliver(&request(CampaignKind::Custom), &messages)
            .await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(mailer.sent_to(), vec!["p1@example.org"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stamps_last_contact() {
        let store = MemoryStore::new();
        let jean = contact("L1", "Jean", Some("jean@example.org"));
        store.insert_contact(jean.clone()).await;

        let mailer = Arc::new(RecordingMailer::new());
        let throttler = throttler(&mailer, &store, None);

        let mut message = outbound("jean@example.org");
        message.recipient.contact_id = Some(jean.id);
        throttler
            .deliver(&request(CampaignKind::Custom), &[message])
            .await;

        let stamped = store.contact(jean.id).await.unwrap();
        assert_eq!(stamped.last_contacted_at, Some(fixed_clock().now_utc()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_summary_after_real_batch() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::new());
        let throttler = throttler(&mailer, &store, Some("bureau@example.org"));

        throttler
            .deliver(&request(CampaignKind::Custom), &batch(2))
            .await;

        let sent = mailer.envelopes();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].to, "bureau@example.org");
        assert!(sent[2].text_body.contains("Envoyés : 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_summary_in_test_mode_or_without_sends() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::failing_for(&["p1@example.org"]));
        let throttler = throttler(&mailer, &store, Some("bureau@example.org"));

        throttler
            .deliver(&request(CampaignKind::Custom), &batch(1))
            .await;
        assert_eq!(mailer.sent_to(), vec!["p1@example.org"]);

        let mut req = request(CampaignKind::Custom);
        req.test_mode = true;
        throttler.deliver(&req, &[outbound("op@example.org")]).await;
        assert_eq!(mailer.sent_to(), vec!["p1@example.org", "op@example.org"]);
    }

    #[test]
    fn test_compose_appends_outro_and_image() {
        let mut req = request(CampaignKind::Custom);
        req.image_url = Some("https://example.org/affiche.png".to_string());
        req.cc_address = Some("club@example.org".to_string());

        let envelope = compose(&req, &outbound("p1@example.org"));
        assert_eq!(
            envelope.text_body,
            "Corps\n\nCordialement\n\nhttps://example.org/affiche.png"
        );
        assert_eq!(envelope.cc.as_deref(), Some("club@example.org"));

        req.test_mode = true;
        assert_eq!(compose(&req, &outbound("p1@example.org")).cc, None);
    }
}
