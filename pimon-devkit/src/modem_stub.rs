/*!
Modem LTE et mailer simulés

`StubModem` keeps an in-memory inbox: `mark_read` clears the unread flag and
`delete_sms` removes the message, so several collector ticks in a row behave
like they would against a real dongle. `StubMailer` records what it was asked
to send.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use pimon_core::forwarding::SmtpSettings;
use pimon_core::sources::{Mailer, ModemClient, ModemFields, OutgoingMail, SmsMessage};
use pimon_core::SourceError;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Inbox message with a UTC timestamp, already in its rendered form.
pub fn sms(index: u32, from: &str, timestamp: &str, message: &str, unread: bool) -> SmsMessage {
    SmsMessage {
        index,
        timestamp: timestamp.into(),
        raw_timestamp: timestamp.into(),
        from: from.into(),
        message: message.into(),
        unread,
    }
}

fn fields(pairs: &[(&str, &str)]) -> ModemFields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub struct StubModem {
    signal: Mutex<ModemFields>,
    inbox: Mutex<Vec<SmsMessage>>,
    mark_read_calls: Mutex<Vec<u32>>,
    deleted: Mutex<Vec<u32>>,
    unreachable: AtomicBool,
    inbox_fails: AtomicBool,
    mark_read_fails: AtomicBool,
    extras_fail: AtomicBool,
}

impl Default for StubModem {
    fn default() -> Self {
        Self::new()
    }
}

impl StubModem {
    pub fn new() -> Self {
        Self::with_inbox(Vec::new())
    }

    pub fn with_inbox(inbox: Vec<SmsMessage>) -> Self {
        Self {
            signal: Mutex::new(fields(&[("rsrp", "-85dBm"), ("rssi", "-61dBm"), ("sinr", "12dB")])),
            inbox: Mutex::new(inbox),
            mark_read_calls: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
            inbox_fails: AtomicBool::new(false),
            mark_read_fails: AtomicBool::new(false),
            extras_fail: AtomicBool::new(false),
        }
    }

    pub fn set_rsrp(&self, rsrp: &str) {
        self.signal.lock().insert("rsrp".into(), rsrp.into());
    }

    pub fn receive(&self, message: SmsMessage) {
        self.inbox.lock().push(message);
    }

    pub fn inbox(&self) -> Vec<SmsMessage> {
        self.inbox.lock().clone()
    }

    /// Signal and device information fail: the dongle is gone.
    pub fn set_unreachable(&self, on: bool) {
        self.unreachable.store(on, Ordering::SeqCst);
    }

    pub fn set_inbox_fails(&self, on: bool) {
        self.inbox_fails.store(on, Ordering::SeqCst);
    }

    pub fn set_mark_read_fails(&self, on: bool) {
        self.mark_read_fails.store(on, Ordering::SeqCst);
    }

    /// Operator and traffic statistics fail, core endpoints keep working.
    pub fn set_extras_fail(&self, on: bool) {
        self.extras_fail.store(on, Ordering::SeqCst);
    }

    pub fn mark_read_calls(&self) -> Vec<u32> {
        self.mark_read_calls.lock().clone()
    }

    pub fn deleted(&self) -> Vec<u32> {
        self.deleted.lock().clone()
    }

    fn reachable(&self) -> Result<(), SourceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SourceError::Http("error sending request: connection refused".into()));
        }
        Ok(())
    }

    fn extras(&self, pairs: &[(&str, &str)]) -> Result<ModemFields, SourceError> {
        self.reachable()?;
        if self.extras_fail.load(Ordering::SeqCst) {
            return Err(SourceError::Http("modem returned error 100002".into()));
        }
        Ok(fields(pairs))
    }
}

#[async_trait]
impl ModemClient for StubModem {
    async fn signal(&self) -> Result<ModemFields, SourceError> {
        self.reachable()?;
        Ok(self.signal.lock().clone())
    }

    async fn device_information(&self) -> Result<ModemFields, SourceError> {
        self.reachable()?;
        Ok(fields(&[("DeviceName", "E3372"), ("Imei", "860000000000000")]))
    }

    async fn current_plmn(&self) -> Result<ModemFields, SourceError> {
        self.extras(&[("FullName", "Telstra"), ("Numeric", "50501")])
    }

    async fn traffic_statistics(&self) -> Result<ModemFields, SourceError> {
        self.extras(&[("CurrentDownload", "1024"), ("CurrentUpload", "512")])
    }

    async fn sms_inbox(&self) -> Result<Vec<SmsMessage>, SourceError> {
        self.reachable()?;
        if self.inbox_fails.load(Ordering::SeqCst) {
            return Err(SourceError::Http("modem returned error 113018".into()));
        }
        Ok(self.inbox.lock().clone())
    }

    async fn mark_read(&self, index: u32) -> Result<(), SourceError> {
        self.reachable()?;
        self.mark_read_calls.lock().push(index);
        if self.mark_read_fails.load(Ordering::SeqCst) {
            return Err(SourceError::Http("modem returned error 125003".into()));
        }
        if let Some(message) = self.inbox.lock().iter_mut().find(|m| m.index == index) {
            message.unread = false;
        }
        Ok(())
    }

    async fn delete_sms(&self, index: u32) -> Result<(), SourceError> {
        self.reachable()?;
        let mut inbox = self.inbox.lock();
        let before = inbox.len();
        inbox.retain(|m| m.index != index);
        if inbox.len() == before {
            return Err(SourceError::Http("modem returned error 113114".into()));
        }
        self.deleted.lock().push(index);
        Ok(())
    }
}

/// Records outgoing mail instead of delivering it.
#[derive(Default)]
pub struct StubMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failure: Mutex<Option<String>>,
}

impl StubMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(reason)` makes every send fail with [`SourceError::Mail`].
    pub fn fail_with(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for StubMailer {
    async fn send(&self, smtp: &SmtpSettings, mail: &OutgoingMail) -> Result<(), SourceError> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(SourceError::Mail(reason));
        }
        let to = mail.to.as_deref().unwrap_or(&smtp.email_to);
        info!("[STUB] Mail to {}: {}", to, mail.subject);
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}
