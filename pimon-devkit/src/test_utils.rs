/*!
Harness de test pour les collecteurs

Bundles a store and a history buffer with the default schedules, and runs
single collector ticks on demand so tests do not need a running scheduler.
*/

use pimon_core::collectors::Intervals;
use pimon_core::forwarding::SmtpSettings;
use pimon_core::{Collector, History, Snapshot, SourceError, Store};
use serde_json::Value;

/// Installs a test-friendly tracing subscriber once; later calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pimon_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub struct TestHarness {
    pub store: Store,
    pub history: History,
    pub intervals: Intervals,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        init_test_logging();
        Self {
            store: Store::new(),
            history: History::new(),
            intervals: Intervals::default(),
        }
    }

    /// SMTP settings with every required field filled in.
    pub fn smtp() -> SmtpSettings {
        SmtpSettings {
            username: "pi@example.com".into(),
            app_password: "app-password".into(),
            email_from: "pi@example.com".into(),
            email_to: "me@example.com".into(),
            ..Default::default()
        }
    }

    pub async fn tick(&self, collector: &dyn Collector) -> Result<(), SourceError> {
        collector.tick(&self.store).await
    }

    pub fn snapshot(&self, key: &str) -> Snapshot {
        self.store.snapshot(key)
    }

    /// Current payload of `key`, `Value::Null` when never published.
    pub fn data(&self, key: &str) -> Value {
        self.store.data(key).unwrap_or(Value::Null)
    }
}
