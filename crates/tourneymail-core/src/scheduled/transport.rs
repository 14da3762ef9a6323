//! Outbound mail transport

use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{Mailbox, SinglePart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration as StdDuration;
use tourneymail_common::config::SmtpConfig;
use tourneymail_common::{Error, Result};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::SendError;

/// A fully rendered message for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: String,
    pub cc: Option<String>,
    pub subject: String,
    pub text_body: String,
}

/// Something that can hand a message to the outside world
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message, returning its Message-ID
    async fn send(&self, envelope: &Envelope) -> std::result::Result<String, SendError>;

    /// Cheap reachability probe run before each tick
    async fn check_available(&self) -> std::result::Result<(), SendError>;
}

/// SMTP relay mailer
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the relay transport from configuration
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let address: Address = config.from_address.parse().map_err(|e| {
            Error::Config(format!("Invalid smtp.from_address '{}': {}", config.from_address, e))
        })?;
        let from = Mailbox::new(config.from_name.clone(), address);

        let mut builder = match config.tls.as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::Config(format!("Failed to create SMTP transport: {}", e)))?,
            "starttls" => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::Config(format!("Failed to create SMTP transport: {}", e)))?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = builder
            .timeout(Some(StdDuration::from_secs(config.timeout_secs)))
            .build();

        info!(
            "SMTP mailer configured for {}:{} ({})",
            config.host, config.port, config.tls
        );

        Ok(Self { transport, from })
    }

    fn build_message(&self, envelope: &Envelope, msg_id: &str) -> std::result::Result<Message, SendError> {
        let to: Mailbox = envelope
            .to
            .parse()
            .map_err(|e| SendError::InvalidAddress(format!("{}: {}", envelope.to, e)))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&envelope.subject)
            .message_id(Some(msg_id.to_string()));

        if let Some(cc) = &envelope.cc {
            let cc: Mailbox = cc
                .parse()
                .map_err(|e| SendError::InvalidAddress(format!("{}: {}", cc, e)))?;
            builder = builder.cc(cc);
        }

        builder
            .singlepart(SinglePart::plain(envelope.text_body.clone()))
            .map_err(|e| SendError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, envelope: &Envelope) -> std::result::Result<String, SendError> {
        let msg_id = format!("<{}.{}@tourneymail>", Uuid::new_v4(), Utc::now().timestamp());
        let message = self.build_message(envelope, &msg_id)?;

        match self.transport.send(message).await {
            Ok(response) => {
                debug!("Email to {} accepted: {:?}", envelope.to, response);
                Ok(msg_id)
            }
            Err(e) => Err(classify(&e)),
        }
    }

    async fn check_available(&self) -> std::result::Result<(), SendError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SendError::Temporary("relay refused the connection".to_string())),
            Err(e) => Err(classify(&e)),
        }
    }
}

fn classify(e: &lettre::transport::smtp::Error) -> SendError {
    let reason = e.to_string();

    if e.is_permanent() {
        if reason.contains("5.1.1")
            || reason.contains("550")
            || reason.contains("User unknown")
            || reason.contains("does not exist")
        {
            SendError::Bounced(reason)
        } else {
            SendError::Permanent(reason)
        }
    } else {
        // Transient replies, timeouts and connection trouble
        SendError::Temporary(reason)
    }
}

/// Mailer that only logs, for dry runs without a relay
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, envelope: &Envelope) -> std::result::Result<String, SendError> {
        let msg_id = format!("<{}@tourneymail.log>", Uuid::new_v4());
        info!(
            to = %envelope.to,
            cc = ?envelope.cc,
            subject = %envelope.subject,
            "Dry-run delivery {}",
            msg_id
        );
        Ok(msg_id)
    }

    async fn check_available(&self) -> std::result::Result<(), SendError> {
        Ok(())
    }
}
