//! SMTP delivery through lettre (implicit TLS or STARTTLS).

use super::{Mailer, OutgoingMail};
use crate::error::SourceError;
use crate::forwarding::SmtpSettings;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_FROM_NAME: &str = "Pi Monitor";

#[derive(Debug, Clone, Default)]
pub struct SmtpMailer;

impl SmtpMailer {
    pub fn new() -> Self {
        SmtpMailer
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, smtp: &SmtpSettings, mail: &OutgoingMail) -> Result<(), SourceError> {
        let message = build_message(smtp, mail)?;
        let credentials = Credentials::new(smtp.username.clone(), smtp.app_password.clone());

        let builder = if smtp.uses_implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.server)
        }
        .map_err(|e| SourceError::Mail(e.to_string()))?;

        let transport = builder
            .port(smtp.port)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        debug!("Sending mail via {}:{} to {:?}", smtp.server, smtp.port, mail.to.as_deref().unwrap_or(&smtp.email_to));
        transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| SourceError::Mail(e.to_string()))
    }
}

fn build_message(smtp: &SmtpSettings, mail: &OutgoingMail) -> Result<Message, SourceError> {
    let from_addr: Address = smtp
        .email_from
        .parse()
        .map_err(|e| SourceError::Mail(format!("invalid from address: {e}")))?;
    let recipient = mail.to.as_deref().filter(|to| !to.is_empty()).unwrap_or(&smtp.email_to);
    let to_addr: Address = recipient
        .parse()
        .map_err(|e| SourceError::Mail(format!("invalid to address: {e}")))?;

    let name = if smtp.email_from_name.trim().is_empty() {
        DEFAULT_FROM_NAME.to_string()
    } else {
        smtp.email_from_name.clone()
    };

    Message::builder()
        .from(Mailbox::new(Some(name), from_addr))
        .to(Mailbox::new(None, to_addr))
        .subject(mail.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())
        .map_err(|e| SourceError::Mail(e.to_string()))
}
