//! Fast metrics: cpu, memory, temperature, network, summary and history.

use crate::error::SourceError;
use crate::history::{History, HistoryPoint};
use crate::keys::{KEY_CPU, KEY_DISK, KEY_HISTORY, KEY_MEMORY, KEY_NETWORK, KEY_SUMMARY, KEY_TEMP};
use crate::scheduler::{Collector, Schedule};
use crate::sources::SystemSource;
use crate::store::Store;
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct FastCollector {
    source: Arc<dyn SystemSource>,
    history: History,
    schedule: Schedule,
}

impl FastCollector {
    pub fn new(source: Arc<dyn SystemSource>, history: History, schedule: Schedule) -> Self {
        Self {
            source,
            history,
            schedule,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}

#[async_trait]
impl Collector for FastCollector {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    async fn tick(&self, store: &Store) -> Result<(), SourceError> {
        let cpu = serde_json::to_value(self.source.cpu().await?)?;
        let memory = serde_json::to_value(self.source.memory().await?)?;
        let temperature = serde_json::to_value(self.source.temperature().await?)?;
        let network = serde_json::to_value(self.source.network().await?)?;
        // last-known disk snapshot, the disk collector runs on its own cadence
        let disk = store.data(KEY_DISK).unwrap_or_else(|| json!({ "filesystems": [] }));

        let summary = json!({
            "cpu": cpu,
            "memory": memory,
            "temperature": temperature,
            "disk": disk,
            "network": network,
            "timestamp": Local::now(),
        });

        let s = &self.schedule;
        store.publish(KEY_CPU, cpu, s.ttl(1.5), None);
        store.publish(KEY_MEMORY, memory, s.ttl(1.5), None);
        store.publish(KEY_TEMP, temperature, s.ttl(2.0), None);
        store.publish(KEY_NETWORK, network, s.ttl(2.0), None);
        store.publish(KEY_SUMMARY, summary, s.ttl(1.5), None);

        if let Some(summary) = store.data(KEY_SUMMARY) {
            self.history.append(history_point(&summary));
        }
        let history = serde_json::to_value(self.history.snapshot())?;
        store.publish(KEY_HISTORY, history, s.ttl(2.0), Some(s.ttl(8.0)));
        Ok(())
    }
}

fn history_point(summary: &Value) -> HistoryPoint {
    let now = Local::now();
    HistoryPoint {
        timestamp: now,
        time: now.format("%H:%M:%S").to_string(),
        cpu_percent: summary["cpu"]["overall_usage"].as_f64().unwrap_or(0.0),
        memory_percent: summary["memory"]["percent"].as_f64().unwrap_or(0.0),
        temperature: summary["temperature"]["cpu_temp"].as_f64().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_from_partial_summary() {
        let point = history_point(&json!({ "cpu": { "overall_usage": 12.5 }, "memory": {} }));
        assert_eq!(point.cpu_percent, 12.5);
        assert_eq!(point.memory_percent, 0.0);
        assert_eq!(point.temperature, 0.0);
        assert_eq!(point.time, point.timestamp.format("%H:%M:%S").to_string());
    }
}
