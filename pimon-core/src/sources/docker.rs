//! Container runtime through the `docker` CLI (`--format '{{json .}}'`).

use super::{run_command, ContainerRuntime};
use crate::error::SourceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Human status, e.g. `Up 3 hours`.
    pub status: String,
    /// Machine state, e.g. `running`, `exited`.
    pub state: String,
    pub ports: String,
    pub created: String,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    /// Bytes
    pub memory_usage: u64,
    /// Bytes
    pub memory_limit: u64,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(ContainerAction::Start),
            "stop" => Some(ContainerAction::Stop),
            "restart" => Some(ContainerAction::Restart),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DockerCli {
    pub program: String,
    pub timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: "docker".into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    async fn docker(&self, args: &[&str]) -> Result<String, SourceError> {
        match run_command(&self.program, args, self.timeout).await {
            Err(SourceError::Command { reason, .. }) if reason.contains("Cannot connect to the Docker daemon") => {
                Err(SourceError::Unavailable("Docker not available".into()))
            }
            Err(SourceError::Unavailable(_)) => Err(SourceError::Unavailable("Docker not available".into())),
            other => other,
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list(&self) -> Result<Vec<ContainerInfo>, SourceError> {
        let stdout = self.docker(&["ps", "-a", "--format", "{{json .}}"]).await?;
        parse_ps(&stdout)
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats, SourceError> {
        let stdout = self.docker(&["stats", "--no-stream", "--format", "{{json .}}", id]).await?;
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| SourceError::Parse(format!("no stats for container {id}")))?;
        parse_stats(line)
    }

    async fn control(&self, id: &str, action: ContainerAction) -> Result<(), SourceError> {
        self.docker(&[action.as_str(), id]).await?;
        info!("Container {}: {} requested", id, action.as_str());
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    names: String,
    image: String,
    status: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    ports: String,
    #[serde(default)]
    created_at: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatsLine {
    #[serde(rename = "CPUPerc")]
    cpu_perc: String,
    mem_usage: String,
    mem_perc: String,
}

fn parse_ps(stdout: &str) -> Result<Vec<ContainerInfo>, SourceError> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| -> Result<ContainerInfo, SourceError> {
            let ps: PsLine = serde_json::from_str(line)?;
            Ok(ContainerInfo {
                id: ps.id.chars().take(12).collect(),
                name: ps.names,
                image: ps.image,
                status: ps.status,
                state: ps.state,
                ports: ps.ports,
                created: ps.created_at,
            })
        })
        .collect()
}

fn parse_stats(line: &str) -> Result<ContainerStats, SourceError> {
    let stats: StatsLine = serde_json::from_str(line)?;
    let (usage, limit) = stats
        .mem_usage
        .split_once('/')
        .ok_or_else(|| SourceError::Parse(format!("invalid memory usage `{}`", stats.mem_usage)))?;
    Ok(ContainerStats {
        cpu_percent: parse_percent(&stats.cpu_perc)?,
        memory_usage: parse_size(usage)?,
        memory_limit: parse_size(limit)?,
        memory_percent: parse_percent(&stats.mem_perc)?,
    })
}

/// `65.3MiB`, `1.8GiB`, `512kB`, `0B` → bytes.
fn parse_size(raw: &str) -> Result<u64, SourceError> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let factor: f64 = match unit {
        "" | "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return Err(SourceError::Parse(format!("invalid size `{raw}`"))),
    };
    number
        .parse::<f64>()
        .map(|n| (n * factor).round() as u64)
        .map_err(|_| SourceError::Parse(format!("invalid size `{raw}`")))
}

fn parse_percent(raw: &str) -> Result<f64, SourceError> {
    raw.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|_| SourceError::Parse(format!("invalid percentage `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ps_json_lines() {
        let out = r#"{"Command":"\"/init\"","CreatedAt":"2024-05-01 10:00:00 +1000 AEST","ID":"4f2a9c1b7d3e8f00aa","Image":"jellyfin/jellyfin","Names":"jellyfin","Ports":"0.0.0.0:8096->8096/tcp","State":"running","Status":"Up 3 hours"}
{"CreatedAt":"2024-05-01","ID":"abc","Image":"portainer","Names":"portainer","Ports":"","State":"exited","Status":"Exited (0) 2 days ago"}
"#;
        let list = parse_ps(out).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "4f2a9c1b7d3e");
        assert!(list[0].is_running());
        assert!(!list[1].is_running());
    }

    #[test]
    fn parses_stats_line() {
        let line = r#"{"BlockIO":"0B / 0B","CPUPerc":"1.25%","MemPerc":"3.40%","MemUsage":"65.3MiB / 1.8GiB","Name":"jellyfin"}"#;
        let stats = parse_stats(line).unwrap();
        assert_eq!(stats.cpu_percent, 1.25);
        assert_eq!(stats.memory_percent, 3.4);
        assert_eq!(stats.memory_usage, 68_472_013);
        assert_eq!(stats.memory_limit, 1_932_735_283);
    }

    #[test]
    fn sizes_in_binary_and_decimal_units() {
        assert_eq!(parse_size("0B").unwrap(), 0);
        assert_eq!(parse_size(" 512kB").unwrap(), 512_000);
        assert_eq!(parse_size("2GiB ").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(matches!(parse_size("lots"), Err(SourceError::Parse(_))));
    }

    #[test]
    fn bad_percentage_is_parse_error() {
        assert!(matches!(parse_percent("--"), Err(SourceError::Parse(_))));
    }

    #[test]
    fn actions_round_trip_from_path() {
        assert_eq!(ContainerAction::parse("restart"), Some(ContainerAction::Restart));
        assert_eq!(ContainerAction::parse("kill"), None);
    }
}
