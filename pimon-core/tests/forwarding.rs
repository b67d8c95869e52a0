//! SMS → email forwarding driven through the dongle collector.

use pimon_core::collectors::DongleCollector;
use pimon_core::forwarding::{ForwardingStatus, SmtpSettings};
use pimon_core::keys::{KEY_DONGLE, KEY_SMS_FORWARDER};
use pimon_devkit::{sms, StubMailer, StubModem, TestHarness};
use std::sync::Arc;

struct Rig {
    harness: TestHarness,
    modem: Arc<StubModem>,
    mailer: Arc<StubMailer>,
    collector: DongleCollector,
}

fn rig(inbox: Vec<pimon_core::sources::SmsMessage>, smtp: SmtpSettings) -> Rig {
    let harness = TestHarness::new();
    let modem = Arc::new(StubModem::with_inbox(inbox));
    let mailer = Arc::new(StubMailer::new());
    let collector = DongleCollector::new(
        Some(modem.clone()),
        mailer.clone(),
        smtp,
        harness.intervals.dongle(),
    );
    Rig {
        harness,
        modem,
        mailer,
        collector,
    }
}

fn forwarder(rig: &Rig) -> ForwardingStatus {
    serde_json::from_value(rig.harness.data(KEY_SMS_FORWARDER)).unwrap()
}

#[tokio::test]
async fn unread_message_is_forwarded_once_and_marked_read() {
    let rig = rig(
        vec![sms(3, "+61400000000", "2024-05-01T10:00:00+00:00", "Your code is 1234", true)],
        TestHarness::smtp(),
    );

    rig.harness.tick(&rig.collector).await.unwrap();

    let sent = rig.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "New SMS from +61400000000");
    assert_eq!(rig.modem.mark_read_calls(), vec![3]);

    let status = forwarder(&rig);
    assert!(status.active);
    assert!(status.configured);
    assert!(status.last_error.is_none());
    assert!(status.last_sent_at.is_some());
    let last = status.last_forwarded_sms.unwrap();
    assert_eq!(last.from, "+61400000000");
    assert_eq!(last.preview, "Your code is 1234");

    // already read on the modem, nothing to resend
    rig.harness.tick(&rig.collector).await.unwrap();
    assert_eq!(rig.mailer.sent().len(), 1);
    assert_eq!(rig.modem.mark_read_calls(), vec![3]);
    assert!(forwarder(&rig).active);
}

#[tokio::test]
async fn failed_send_leaves_message_unread_until_it_succeeds() {
    let rig = rig(
        vec![sms(7, "+61411111111", "2024-05-01T11:00:00+00:00", "hello", true)],
        TestHarness::smtp(),
    );
    rig.mailer.fail_with(Some("535 authentication failed"));

    rig.harness.tick(&rig.collector).await.unwrap();
    assert!(rig.modem.mark_read_calls().is_empty());
    assert!(rig.modem.inbox()[0].unread);
    let status = forwarder(&rig);
    assert!(!status.active);
    assert!(status.configured);
    assert_eq!(
        status.last_error.as_deref(),
        Some("mail delivery failed: 535 authentication failed")
    );

    rig.mailer.fail_with(None);
    rig.harness.tick(&rig.collector).await.unwrap();
    assert_eq!(rig.mailer.sent().len(), 1);
    assert_eq!(rig.modem.mark_read_calls(), vec![7]);
    let status = forwarder(&rig);
    assert!(status.active);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn one_failure_in_a_tick_keeps_the_error_visible() {
    let rig = rig(
        vec![
            sms(1, "+1", "2024-05-01T09:00:00+00:00", "first", true),
            sms(2, "+2", "2024-05-01T09:05:00+00:00", "second", true),
        ],
        TestHarness::smtp(),
    );
    rig.mailer.fail_with(Some("timeout"));
    rig.harness.tick(&rig.collector).await.unwrap();
    assert_eq!(forwarder(&rig).last_error.as_deref(), Some("mail delivery failed: timeout"));
    assert_eq!(rig.modem.inbox().iter().filter(|m| m.unread).count(), 2);
}

#[tokio::test]
async fn unconfigured_smtp_forwards_nothing() {
    let rig = rig(
        vec![sms(1, "+1", "2024-05-01T09:00:00+00:00", "ping", true)],
        SmtpSettings::default(),
    );

    rig.harness.tick(&rig.collector).await.unwrap();

    assert!(rig.mailer.sent().is_empty());
    assert!(rig.modem.mark_read_calls().is_empty());
    assert!(rig.modem.inbox()[0].unread);
    let status = forwarder(&rig);
    assert!(!status.configured);
    assert!(!status.active);
    assert_eq!(status.last_error.as_deref(), Some("Missing SMTP field: username"));
}

#[tokio::test]
async fn mark_read_failure_means_forwarded_again() {
    let rig = rig(
        vec![sms(4, "+1", "2024-05-01T09:00:00+00:00", "dup", true)],
        TestHarness::smtp(),
    );
    rig.modem.set_mark_read_fails(true);

    rig.harness.tick(&rig.collector).await.unwrap();
    rig.harness.tick(&rig.collector).await.unwrap();

    assert_eq!(rig.mailer.sent().len(), 2);
    assert_eq!(rig.modem.mark_read_calls(), vec![4, 4]);
    assert!(forwarder(&rig).active);
}

#[tokio::test]
async fn previous_forward_survives_an_idle_tick() {
    let rig = rig(
        vec![sms(1, "+1", "2024-05-01T09:00:00+00:00", "first", true)],
        TestHarness::smtp(),
    );
    rig.harness.tick(&rig.collector).await.unwrap();
    let first = forwarder(&rig);

    rig.harness.tick(&rig.collector).await.unwrap();
    let second = forwarder(&rig);
    assert_eq!(second.last_sent_at, first.last_sent_at);
    assert_eq!(second.last_forwarded_sms, first.last_forwarded_sms);
}

#[tokio::test]
async fn inbox_failure_is_recorded_but_status_still_published() {
    let rig = rig(Vec::new(), TestHarness::smtp());
    rig.modem.set_inbox_fails(true);

    rig.harness.tick(&rig.collector).await.unwrap();

    let status = forwarder(&rig);
    assert!(!status.active);
    assert_eq!(status.last_error.as_deref(), Some("http error: modem returned error 113018"));
    let dongle = rig.harness.data(KEY_DONGLE);
    assert_eq!(dongle["connected"], true);
    assert_eq!(dongle["sms_messages"], serde_json::json!([]));
}

#[tokio::test]
async fn unreachable_modem_publishes_nothing() {
    let rig = rig(Vec::new(), TestHarness::smtp());
    rig.harness.tick(&rig.collector).await.unwrap();
    let before = rig.harness.data(KEY_DONGLE);

    rig.modem.set_unreachable(true);
    let err = rig.harness.tick(&rig.collector).await.unwrap_err();
    assert!(err.to_string().contains("connection refused"));

    // previous entries are left to age
    assert_eq!(rig.harness.data(KEY_DONGLE), before);
}

#[tokio::test]
async fn dongle_entry_shape() {
    let rig = rig(
        vec![
            sms(1, "+1", "2024-05-01T09:00:00+00:00", "old", false),
            sms(2, "+2", "2024-05-02T09:00:00+00:00", "new", false),
        ],
        TestHarness::smtp(),
    );
    rig.modem.set_rsrp("-95dBm");
    rig.modem.set_extras_fail(true);

    rig.harness.tick(&rig.collector).await.unwrap();

    let dongle = rig.harness.data(KEY_DONGLE);
    assert_eq!(dongle["signal"]["strength"], 3);
    assert_eq!(dongle["signal"]["color"], "yellow");
    assert_eq!(dongle["signal"]["status"]["rsrp"], "-95dBm");
    assert_eq!(dongle["device"]["DeviceName"], "E3372");
    assert_eq!(dongle["network"], serde_json::json!({}));
    assert_eq!(dongle["traffic"], serde_json::json!({}));
    assert_eq!(dongle["sms_messages"][0]["index"], 2);
    assert_eq!(dongle["sms_messages"][1]["index"], 1);

    let meta = rig.harness.snapshot(KEY_DONGLE).meta;
    assert_eq!(meta.ttl, Some(7.5));
    assert_eq!(meta.stale_ttl, Some(20.0));
}

#[tokio::test]
async fn missing_modem_is_a_steady_state() {
    let harness = TestHarness::new();
    let mailer = Arc::new(StubMailer::new());
    let collector = DongleCollector::new(None, mailer, TestHarness::smtp(), harness.intervals.dongle());

    harness.tick(&collector).await.unwrap();

    let dongle = harness.data(KEY_DONGLE);
    assert_eq!(dongle["connected"], false);
    assert_eq!(dongle["error"], "modem not configured");
    let status: ForwardingStatus = serde_json::from_value(harness.data(KEY_SMS_FORWARDER)).unwrap();
    assert!(!status.active);
    assert_eq!(status.last_error.as_deref(), Some("modem not configured"));
}

#[tokio::test]
async fn test_send_updates_forwarder_entry() {
    let rig = rig(Vec::new(), TestHarness::smtp());

    let status = rig.collector.test_send(&rig.harness.store).await.unwrap();
    assert!(status.active);
    assert!(status.last_sent_at.is_some());
    assert_eq!(rig.mailer.sent().len(), 1);
    assert_eq!(forwarder(&rig), status);

    rig.mailer.fail_with(Some("relay denied"));
    let status = rig.collector.test_send(&rig.harness.store).await.unwrap();
    assert_eq!(status.last_error.as_deref(), Some("mail delivery failed: relay denied"));
    // the earlier success stays on record
    assert!(status.last_sent_at.is_some());
}
