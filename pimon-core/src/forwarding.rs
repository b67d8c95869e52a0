/**
 * SMS FORWARDER - Machine d'état du transfert SMS → email
 *
 * ROLE:
 * Derived status describing whether inbound-SMS forwarding is configured and
 * currently succeeding. Driven by the dongle collector once per tick and
 * published like any other cache entry.
 *
 * ETATS:
 * - unconfigured: a required SMTP field is empty (`configured=false`, reason in `last_error`)
 * - active: configured, last attempt succeeded or nothing to send
 * - error: configured, last attempted send (or inbox listing) failed
 *
 * GARANTIES:
 * - a message is marked read only after its email was accepted
 * - a failed send leaves the message unread, so the next tick retries it
 * - at-least-once: if mark-read fails after a successful send, the message is
 *   forwarded again next tick
 */

use crate::error::SourceError;
use crate::sources::{Mailer, ModemClient, OutgoingMail, SmsMessage};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Fields that must all be non-empty for forwarding to be configured.
pub const REQUIRED_SMTP_FIELDS: [&str; 6] = ["server", "port", "username", "app_password", "email_from", "email_to"];

pub const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    /// `ssl` (implicit TLS) or `starttls`.
    pub secure: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub app_password: String,
    pub email_from: String,
    pub email_from_name: String,
    pub email_to: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: "smtp.gmail.com".into(),
            port: 465,
            secure: "ssl".into(),
            username: String::new(),
            app_password: String::new(),
            email_from: String::new(),
            email_from_name: String::new(),
            email_to: String::new(),
        }
    }
}

impl SmtpSettings {
    /// First required field that is empty, in [`REQUIRED_SMTP_FIELDS`] order.
    pub fn missing_field(&self) -> Option<&'static str> {
        REQUIRED_SMTP_FIELDS.into_iter().find(|field| match *field {
            "server" => self.server.trim().is_empty(),
            "port" => self.port == 0,
            "username" => self.username.trim().is_empty(),
            "app_password" => self.app_password.is_empty(),
            "email_from" => self.email_from.trim().is_empty(),
            "email_to" => self.email_to.trim().is_empty(),
            _ => false,
        })
    }

    /// `Err` carries a human-readable reason.
    pub fn check_configured(&self) -> Result<(), String> {
        match self.missing_field() {
            Some(field) => Err(format!("Missing SMTP field: {field}")),
            None => Ok(()),
        }
    }

    pub fn uses_implicit_tls(&self) -> bool {
        let secure = self.secure.trim().to_ascii_lowercase();
        secure.is_empty() || secure == "ssl"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedSms {
    pub from: String,
    pub timestamp: String,
    pub preview: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingStatus {
    pub active: bool,
    pub configured: bool,
    pub last_error: Option<String>,
    pub last_sent_at: Option<DateTime<Local>>,
    pub last_forwarded_sms: Option<ForwardedSms>,
}

impl ForwardingStatus {
    /// Inactive, unconfigured status carrying `reason`. Used when the modem
    /// itself cannot be reached.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            last_error: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Trimmed content, cut to 80 characters with `...` appended when cut.
pub fn preview(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() > PREVIEW_CHARS {
        let cut: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        content.to_string()
    }
}

pub fn sms_mail(message: &SmsMessage) -> OutgoingMail {
    let from = if message.from.is_empty() { "Unknown" } else { &message.from };
    OutgoingMail {
        subject: format!("New SMS from {from}"),
        body: format!("From: {}\nTime: {}\n\n{}", message.from, message.timestamp, message.message),
        to: None,
    }
}

/// One tick of the forwarding state machine.
///
/// `start` → zero or more `forward` / `listing_failed` → `finish`.
pub struct ForwardingRun<'a> {
    smtp: &'a SmtpSettings,
    status: ForwardingStatus,
    sent: usize,
    failed: bool,
}

impl<'a> ForwardingRun<'a> {
    /// Carries `last_sent_at` and `last_forwarded_sms` over from the previous
    /// status and evaluates the configured check.
    pub fn start(smtp: &'a SmtpSettings, previous: Option<&ForwardingStatus>) -> Self {
        let mut status = ForwardingStatus {
            last_sent_at: previous.and_then(|p| p.last_sent_at),
            last_forwarded_sms: previous.and_then(|p| p.last_forwarded_sms.clone()),
            ..Default::default()
        };
        match smtp.check_configured() {
            Ok(()) => status.configured = true,
            Err(reason) => status.last_error = Some(reason),
        }
        Self {
            smtp,
            status,
            sent: 0,
            failed: false,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.status.configured
    }

    pub fn listing_failed(&mut self, err: &SourceError) {
        warn!(error = %err, "SMS inbox listing failed");
        self.status.last_error = Some(err.to_string());
        self.failed = true;
    }

    /// Forwards one inbox message if it is unread and forwarding is configured.
    pub async fn forward(&mut self, modem: &dyn ModemClient, mailer: &dyn Mailer, message: &SmsMessage) {
        if !message.unread || !self.status.configured {
            return;
        }

        if let Err(err) = mailer.send(self.smtp, &sms_mail(message)).await {
            warn!(index = message.index, error = %err, "SMS forward failed, leaving message unread");
            self.status.last_error = Some(err.to_string());
            self.failed = true;
            return;
        }

        self.sent += 1;
        self.status.active = true;
        self.status.last_sent_at = Some(Local::now());
        self.status.last_forwarded_sms = Some(ForwardedSms {
            from: message.from.clone(),
            timestamp: message.timestamp.clone(),
            preview: preview(&message.message),
        });
        if !self.failed {
            self.status.last_error = None;
        }
        info!(index = message.index, from = %message.from, "SMS forwarded by email");

        if let Err(err) = modem.mark_read(message.index).await {
            warn!(index = message.index, error = %err, "Failed to mark forwarded SMS as read");
        }
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Configured with nothing sent and no error this tick counts as active.
    pub fn finish(mut self) -> ForwardingStatus {
        if self.status.configured && self.sent == 0 && self.status.last_error.is_none() {
            self.status.active = true;
        }
        self.status
    }
}

/// Runs a full tick over an inbox listing result.
pub async fn forward_inbox(
    modem: &dyn ModemClient,
    mailer: &dyn Mailer,
    smtp: &SmtpSettings,
    inbox: &Result<Vec<SmsMessage>, SourceError>,
    previous: Option<&ForwardingStatus>,
) -> ForwardingStatus {
    let mut run = ForwardingRun::start(smtp, previous);
    match inbox {
        Ok(messages) => {
            for message in messages {
                run.forward(modem, mailer, message).await;
            }
        }
        Err(err) => run.listing_failed(err),
    }
    run.finish()
}

/// Manual test-send: one email to the configured recipient, status updated
/// like a forward (without touching `last_forwarded_sms`).
pub async fn send_test(mailer: &dyn Mailer, smtp: &SmtpSettings, previous: Option<&ForwardingStatus>) -> ForwardingStatus {
    let mut status = previous.cloned().unwrap_or_default();
    if let Err(reason) = smtp.check_configured() {
        status.configured = false;
        status.active = false;
        status.last_error = Some(reason);
        return status;
    }
    status.configured = true;

    let mail = OutgoingMail {
        subject: "PiMon SMS forwarding test".into(),
        body: "This is a test message from the SMS forwarder.".into(),
        to: None,
    };
    match mailer.send(smtp, &mail).await {
        Ok(()) => {
            status.active = true;
            status.last_error = None;
            status.last_sent_at = Some(Local::now());
            info!("Test email sent to {}", smtp.email_to);
        }
        Err(err) => {
            warn!(error = %err, "Test email failed");
            status.last_error = Some(err.to_string());
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> SmtpSettings {
        SmtpSettings {
            username: "u".into(),
            app_password: "p".into(),
            email_from: "a@example.com".into(),
            email_to: "b@example.com".into(),
            ..Default::default()
        }
    }

    #[test]
    fn each_required_field_is_checked() {
        assert_eq!(configured().check_configured(), Ok(()));

        let mut smtp = configured();
        smtp.username.clear();
        assert_eq!(smtp.check_configured(), Err("Missing SMTP field: username".into()));

        let mut smtp = configured();
        smtp.port = 0;
        assert_eq!(smtp.missing_field(), Some("port"));

        assert_eq!(SmtpSettings::default().missing_field(), Some("username"));
    }

    #[test]
    fn preview_truncates_with_ellipsis() {
        assert_eq!(preview("  short  "), "short");
        let long = "x".repeat(81);
        let p = preview(&long);
        assert_eq!(p.len(), 83);
        assert!(p.ends_with("..."));
        assert_eq!(preview(&"y".repeat(80)), "y".repeat(80));
        assert_eq!(preview(&"é".repeat(90)).chars().count(), 83);
    }

    #[test]
    fn unconfigured_run_reports_reason() {
        let smtp = SmtpSettings::default();
        let status = ForwardingRun::start(&smtp, None).finish();
        assert!(!status.configured);
        assert!(!status.active);
        assert_eq!(status.last_error.as_deref(), Some("Missing SMTP field: username"));
    }

    #[test]
    fn configured_idle_run_is_active() {
        let smtp = configured();
        let status = ForwardingRun::start(&smtp, None).finish();
        assert!(status.configured);
        assert!(status.active);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn listing_failure_keeps_previous_forward() {
        let smtp = configured();
        let previous = ForwardingStatus {
            active: true,
            configured: true,
            last_error: None,
            last_sent_at: Some(Local::now()),
            last_forwarded_sms: Some(ForwardedSms {
                from: "+1".into(),
                timestamp: "t".into(),
                preview: "hi".into(),
            }),
        };
        let mut run = ForwardingRun::start(&smtp, Some(&previous));
        run.listing_failed(&SourceError::Http("timeout".into()));
        let status = run.finish();
        assert!(!status.active);
        assert_eq!(status.last_error.as_deref(), Some("http error: timeout"));
        assert_eq!(status.last_sent_at, previous.last_sent_at);
        assert_eq!(status.last_forwarded_sms, previous.last_forwarded_sms);
    }

    #[test]
    fn mail_subject_and_body() {
        let msg = SmsMessage {
            index: 1,
            timestamp: "2024-05-01T20:00:00+10:00".into(),
            raw_timestamp: "2024-05-01 10:00:00".into(),
            from: String::new(),
            message: "hello".into(),
            unread: true,
        };
        let mail = sms_mail(&msg);
        assert_eq!(mail.subject, "New SMS from Unknown");
        assert_eq!(mail.body, "From: \nTime: 2024-05-01T20:00:00+10:00\n\nhello");
    }
}
