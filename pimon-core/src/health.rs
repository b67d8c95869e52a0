//! Coarse health verdict derived from the latest summary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TEMP_CRITICAL_C: f64 = 80.0;
pub const TEMP_WARNING_C: f64 = 70.0;
pub const CPU_CRITICAL_PERCENT: f64 = 95.0;
pub const CPU_WARNING_PERCENT: f64 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn evaluate(temperature_c: f64, cpu_percent: f64) -> Self {
        if temperature_c >= TEMP_CRITICAL_C || cpu_percent >= CPU_CRITICAL_PERCENT {
            HealthStatus::Critical
        } else if temperature_c >= TEMP_WARNING_C || cpu_percent >= CPU_WARNING_PERCENT {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }

    /// Reads `temperature.cpu_temp` and `cpu.overall_usage` from a summary
    /// payload. No summary yet means healthy.
    pub fn from_summary(summary: Option<&Value>) -> Self {
        let Some(summary) = summary else {
            return HealthStatus::Healthy;
        };
        let temp = summary["temperature"]["cpu_temp"].as_f64().unwrap_or(0.0);
        let cpu = summary["cpu"]["overall_usage"].as_f64().unwrap_or(0.0);
        Self::evaluate(temp, cpu)
    }
}
