//! External sources consumed by the collectors
//!
//! Each source is a black-box, single-shot query returning a value or a
//! [`SourceError`]; none of them keeps scheduling state. Collectors hold them
//! as trait objects so tests can swap in scripted stubs.
//!
//! Real implementations:
//! - [`system::SysinfoReader`]: CPU, memory, temperature, network, disk
//! - [`usb::LsusbReader`]: `lsusb` output
//! - [`docker::DockerCli`]: `docker` CLI (JSON lines)
//! - [`modem::HilinkModem`]: Huawei HiLink HTTP API
//! - [`mailer::SmtpMailer`]: SMTP delivery

pub mod docker;
pub mod mailer;
pub mod modem;
pub mod system;
pub mod usb;

use crate::error::SourceError;
use crate::forwarding::SmtpSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub use docker::{ContainerAction, ContainerInfo, ContainerStats};
pub use modem::SmsMessage;
pub use system::{CpuMetrics, DiskIoStats, DiskMetrics, MemoryMetrics, NetworkMetrics, TemperatureMetrics};
pub use usb::UsbDevice;

/// Host telemetry. Sensor-less hosts report a zero temperature with an
/// `error` note rather than failing.
#[async_trait]
pub trait SystemSource: Send + Sync {
    async fn cpu(&self) -> Result<CpuMetrics, SourceError>;
    async fn memory(&self) -> Result<MemoryMetrics, SourceError>;
    async fn temperature(&self) -> Result<TemperatureMetrics, SourceError>;
    async fn network(&self) -> Result<NetworkMetrics, SourceError>;
    async fn disk(&self) -> Result<DiskMetrics, SourceError>;
}

#[async_trait]
pub trait UsbSource: Send + Sync {
    async fn devices(&self) -> Result<Vec<UsbDevice>, SourceError>;
}

/// Container runtime. [`SourceError::Unavailable`] means the runtime itself
/// is absent, which the containers collector reports as data, not failure.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list(&self) -> Result<Vec<ContainerInfo>, SourceError>;
    async fn stats(&self, id: &str) -> Result<ContainerStats, SourceError>;
    async fn control(&self, id: &str, action: ContainerAction) -> Result<(), SourceError>;
}

/// Flat field map of one modem API response (`<Tag>value</Tag>` pairs).
pub type ModemFields = BTreeMap<String, String>;

#[async_trait]
pub trait ModemClient: Send + Sync {
    async fn signal(&self) -> Result<ModemFields, SourceError>;
    async fn device_information(&self) -> Result<ModemFields, SourceError>;
    async fn current_plmn(&self) -> Result<ModemFields, SourceError>;
    async fn traffic_statistics(&self) -> Result<ModemFields, SourceError>;
    async fn sms_inbox(&self) -> Result<Vec<SmsMessage>, SourceError>;
    async fn mark_read(&self, index: u32) -> Result<(), SourceError>;
    async fn delete_sms(&self, index: u32) -> Result<(), SourceError>;
}

/// One outgoing email. `to` overrides the configured recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub subject: String,
    pub body: String,
    pub to: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, smtp: &SmtpSettings, mail: &OutgoingMail) -> Result<(), SourceError>;
}

/// Runs a subprocess with a deadline and returns its stdout.
///
/// A missing binary maps to [`SourceError::Unavailable`].
pub(crate) async fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<String, SourceError> {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!("Executing command: {}", command_line);

    let child = Command::new(program).args(args).kill_on_drop(true).output();
    let output = match tokio::time::timeout(timeout, child).await {
        Err(_) => {
            return Err(SourceError::Command {
                command: command_line,
                reason: format!("timed out after {}s", timeout.as_secs()),
            })
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SourceError::Unavailable(format!("{program} not found")))
        }
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(SourceError::Command {
            command: command_line,
            reason: if stderr.is_empty() { format!("exit status {}", output.status) } else { stderr },
        });
    }

    String::from_utf8(output.stdout).map_err(|e| SourceError::Parse(e.to_string()))
}
