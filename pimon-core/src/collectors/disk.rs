use crate::error::SourceError;
use crate::keys::KEY_DISK;
use crate::scheduler::{Collector, Schedule};
use crate::sources::SystemSource;
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;

/// Filesystem usage. Slow to walk on some hosts, hence its own cadence.
pub struct DiskCollector {
    source: Arc<dyn SystemSource>,
    schedule: Schedule,
}

impl DiskCollector {
    pub fn new(source: Arc<dyn SystemSource>, schedule: Schedule) -> Self {
        Self { source, schedule }
    }
}

#[async_trait]
impl Collector for DiskCollector {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    async fn tick(&self, store: &Store) -> Result<(), SourceError> {
        let disk = serde_json::to_value(self.source.disk().await?)?;
        store.publish(KEY_DISK, disk, self.schedule.ttl(1.5), Some(self.schedule.ttl(6.0)));
        Ok(())
    }
}
