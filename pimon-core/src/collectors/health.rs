use crate::error::SourceError;
use crate::health::HealthStatus;
use crate::keys::{KEY_HEALTH, KEY_SUMMARY};
use crate::scheduler::{Collector, Schedule};
use crate::store::Store;
use async_trait::async_trait;
use chrono::Local;
use serde_json::json;

/// Health rollup over the latest summary. No I/O of its own.
pub struct HealthCollector {
    schedule: Schedule,
}

impl HealthCollector {
    pub fn new(schedule: Schedule) -> Self {
        Self { schedule }
    }
}

#[async_trait]
impl Collector for HealthCollector {
    fn name(&self) -> &'static str {
        "health"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    async fn tick(&self, store: &Store) -> Result<(), SourceError> {
        let summary = store.data(KEY_SUMMARY);
        let status = HealthStatus::from_summary(summary.as_ref());
        store.publish(
            KEY_HEALTH,
            json!({ "status": status, "timestamp": Local::now() }),
            self.schedule.ttl(2.0),
            None,
        );
        Ok(())
    }
}
