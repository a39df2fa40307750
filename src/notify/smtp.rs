use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::SmtpConfig;

use super::{NotificationEvent, NotifyError, Transport};

/// SMTP submission with STARTTLS to a single fixed recipient
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    /// Build the transport; no connection is made until the first send
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(config.sender())?;
        let to = parse_mailbox(&config.recipient)?;

        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(credentials)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        debug!(host = %config.host, port = config.port, to = %to, "SMTP transport configured");
        Ok(Self { mailer, from, to })
    }

    fn message(&self, event: &NotificationEvent) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(event.subject.as_str())
            .date(event.timestamp.into())
            .header(ContentType::TEXT_PLAIN)
            .body(event.body.clone())
            .map_err(|e| NotifyError::Message(e.to_string()))
    }
}

#[async_trait]
impl Transport for SmtpMailer {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let message = self.message(event)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}
