use crate::error::SourceError;
use crate::keys::KEY_USB;
use crate::scheduler::{Collector, Schedule};
use crate::sources::UsbSource;
use crate::store::Store;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct UsbCollector {
    source: Arc<dyn UsbSource>,
    schedule: Schedule,
}

impl UsbCollector {
    pub fn new(source: Arc<dyn UsbSource>, schedule: Schedule) -> Self {
        Self { source, schedule }
    }
}

#[async_trait]
impl Collector for UsbCollector {
    fn name(&self) -> &'static str {
        "usb"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    async fn tick(&self, store: &Store) -> Result<(), SourceError> {
        let devices = self.source.devices().await?;
        store.publish(
            KEY_USB,
            json!({ "devices": devices }),
            self.schedule.ttl(1.5),
            Some(self.schedule.ttl(6.0)),
        );
        Ok(())
    }
}
