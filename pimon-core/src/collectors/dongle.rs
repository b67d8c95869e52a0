/**
 * DONGLE COLLECTOR - Statut modem LTE + transfert SMS → email
 *
 * ROLE:
 * One tick reads signal, device information, operator and traffic counters,
 * lists the SMS inbox, forwards unread messages by email, then publishes two
 * entries: the dongle status and the forwarder status.
 *
 * FONCTIONNEMENT:
 * - operator and traffic are optional: a failure degrades them to `{}`
 * - an inbox listing failure lands in the forwarder's `last_error`, the tick
 *   itself still succeeds
 * - signal or device information failing means the modem is unreachable:
 *   the tick fails and nothing is published
 * - the previous forwarder entry is read back from the store at the start of
 *   each tick so `last_sent_at` / `last_forwarded_sms` carry over
 */

use crate::error::SourceError;
use crate::forwarding::{self, ForwardingStatus, SmtpSettings};
use crate::keys::{KEY_DONGLE, KEY_SMS_FORWARDER};
use crate::scheduler::{Collector, Schedule};
use crate::sources::modem::{signal_color, signal_strength};
use crate::sources::{Mailer, ModemClient, ModemFields};
use crate::store::Store;
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const MODEM_NOT_CONFIGURED: &str = "modem not configured";

pub struct DongleCollector {
    modem: Option<Arc<dyn ModemClient>>,
    mailer: Arc<dyn Mailer>,
    smtp: SmtpSettings,
    schedule: Schedule,
}

impl DongleCollector {
    /// `modem: None` publishes a permanent "not configured" state.
    pub fn new(
        modem: Option<Arc<dyn ModemClient>>,
        mailer: Arc<dyn Mailer>,
        smtp: SmtpSettings,
        schedule: Schedule,
    ) -> Self {
        Self {
            modem,
            mailer,
            smtp,
            schedule,
        }
    }

    pub fn modem(&self) -> Option<&Arc<dyn ModemClient>> {
        self.modem.as_ref()
    }

    /// Manual test-send. Publishes and returns the updated forwarder status.
    pub async fn test_send(&self, store: &Store) -> Result<ForwardingStatus, SourceError> {
        let previous = previous_status(store);
        let status = forwarding::send_test(self.mailer.as_ref(), &self.smtp, previous.as_ref()).await;
        self.publish_forwarder(store, &status)?;
        Ok(status)
    }

    fn publish_forwarder(&self, store: &Store, status: &ForwardingStatus) -> Result<(), SourceError> {
        store.publish(
            KEY_SMS_FORWARDER,
            serde_json::to_value(status)?,
            self.schedule.ttl(2.0),
            Some(self.schedule.ttl(6.0)),
        );
        Ok(())
    }

    async fn poll(&self, modem: &dyn ModemClient, store: &Store) -> Result<(Value, ForwardingStatus), SourceError> {
        let signal = modem.signal().await?;
        let strength = signal_strength(signal.get("rsrp").map(String::as_str).unwrap_or("0dBm"));
        let device = modem.device_information().await?;
        let network = optional(modem.current_plmn().await, "current plmn");
        let traffic = optional(modem.traffic_statistics().await, "traffic statistics");

        let inbox = modem.sms_inbox().await;
        let previous = previous_status(store);
        let forwarder =
            forwarding::forward_inbox(modem, self.mailer.as_ref(), &self.smtp, &inbox, previous.as_ref()).await;

        let mut messages = inbox.unwrap_or_default();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let dongle = json!({
            "signal": {
                "status": signal,
                "strength": strength,
                "color": signal_color(strength),
            },
            "device": device,
            "network": network,
            "traffic": traffic,
            "sms_messages": messages,
            "connected": true,
            "timestamp": Local::now(),
        });
        Ok((dongle, forwarder))
    }
}

#[async_trait]
impl Collector for DongleCollector {
    fn name(&self) -> &'static str {
        "dongle"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    async fn tick(&self, store: &Store) -> Result<(), SourceError> {
        let Some(modem) = &self.modem else {
            store.publish(
                KEY_DONGLE,
                json!({ "error": MODEM_NOT_CONFIGURED, "connected": false }),
                self.schedule.ttl(2.0),
                None,
            );
            let status = ForwardingStatus::unavailable(MODEM_NOT_CONFIGURED);
            store.publish(KEY_SMS_FORWARDER, serde_json::to_value(status)?, self.schedule.ttl(2.0), None);
            return Ok(());
        };

        let (dongle, forwarder) = self.poll(modem.as_ref(), store).await?;
        store.publish(KEY_DONGLE, dongle, self.schedule.ttl(1.5), Some(self.schedule.ttl(4.0)));
        self.publish_forwarder(store, &forwarder)
    }
}

fn previous_status(store: &Store) -> Option<ForwardingStatus> {
    store
        .data(KEY_SMS_FORWARDER)
        .and_then(|value| serde_json::from_value(value).ok())
}

fn optional(result: Result<ModemFields, SourceError>, what: &str) -> ModemFields {
    result.unwrap_or_else(|err| {
        debug!(error = %err, "Modem {} unavailable", what);
        ModemFields::new()
    })
}
