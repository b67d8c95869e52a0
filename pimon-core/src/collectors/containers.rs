use crate::error::SourceError;
use crate::keys::KEY_DOCKER;
use crate::scheduler::{Collector, Schedule};
use crate::sources::ContainerRuntime;
use crate::store::Store;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Container inventory with per-container stats for running ones.
///
/// A missing runtime is published as `{containers: [], error}` rather than
/// failing the tick: "no docker on this host" is a steady state, not an
/// outage.
pub struct ContainersCollector {
    runtime: Arc<dyn ContainerRuntime>,
    schedule: Schedule,
}

impl ContainersCollector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, schedule: Schedule) -> Self {
        Self { runtime, schedule }
    }
}

#[async_trait]
impl Collector for ContainersCollector {
    fn name(&self) -> &'static str {
        "containers"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    async fn tick(&self, store: &Store) -> Result<(), SourceError> {
        let containers = match self.runtime.list().await {
            Ok(containers) => containers,
            Err(SourceError::Unavailable(reason)) => {
                store.publish(
                    KEY_DOCKER,
                    json!({ "containers": [], "error": reason }),
                    self.schedule.ttl(2.0),
                    None,
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let mut entries = Vec::with_capacity(containers.len());
        for container in &containers {
            let stats = if container.is_running() {
                match self.runtime.stats(&container.id).await {
                    Ok(stats) => serde_json::to_value(stats)?,
                    Err(err) => {
                        debug!(container = %container.name, error = %err, "Stats unavailable");
                        json!({ "error": err.to_string() })
                    }
                }
            } else {
                json!({})
            };
            let mut entry = serde_json::to_value(container)?;
            if let Value::Object(map) = &mut entry {
                map.insert("stats".into(), stats);
            }
            entries.push(entry);
        }

        store.publish(
            KEY_DOCKER,
            json!({ "containers": entries }),
            self.schedule.ttl(1.5),
            Some(self.schedule.ttl(4.0)),
        );
        Ok(())
    }
}
