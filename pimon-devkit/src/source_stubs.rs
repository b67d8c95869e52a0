/*!
Stubs de sources système, USB et conteneurs

Every stub returns whatever was last scripted into it and counts its calls.
`fail_with` makes every subsequent call return that error until cleared.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use pimon_core::sources::docker::ContainerAction;
use pimon_core::sources::system::{Filesystem, LoadAverage};
use pimon_core::sources::{
    ContainerInfo, ContainerRuntime, ContainerStats, CpuMetrics, DiskIoStats, DiskMetrics, MemoryMetrics, NetworkMetrics,
    SystemSource, TemperatureMetrics, UsbDevice, UsbSource,
};
use pimon_core::SourceError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted host telemetry.
pub struct StubSystem {
    cpu: Mutex<CpuMetrics>,
    memory: Mutex<MemoryMetrics>,
    temperature: Mutex<TemperatureMetrics>,
    disk: Mutex<DiskMetrics>,
    failure: Mutex<Option<SourceError>>,
    calls: AtomicUsize,
}

impl Default for StubSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl StubSystem {
    /// A quiet host: 10% cpu, 40% memory, 45°C, one root filesystem.
    pub fn new() -> Self {
        Self {
            cpu: Mutex::new(CpuMetrics {
                overall_usage: 10.0,
                per_core_usage: vec![10.0; 4],
                current_frequency: 1500,
                load_average: LoadAverage {
                    one: 0.2,
                    five: 0.1,
                    fifteen: 0.05,
                },
            }),
            memory: Mutex::new(MemoryMetrics {
                total: 4_000_000_000,
                used: 1_600_000_000,
                available: 2_400_000_000,
                percent: 40.0,
                ..Default::default()
            }),
            temperature: Mutex::new(TemperatureMetrics {
                cpu_temp: 45.0,
                unit: "C".into(),
                error: None,
            }),
            disk: Mutex::new(DiskMetrics {
                filesystems: vec![Filesystem {
                    device: "/dev/mmcblk0p2".into(),
                    mountpoint: "/".into(),
                    fstype: "ext4".into(),
                    total: 32_000_000_000,
                    used: 8_000_000_000,
                    free: 24_000_000_000,
                    percent: 25.0,
                }],
                io_stats: Some(DiskIoStats {
                    read_bytes: 1_048_576,
                    write_bytes: 524_288,
                    read_count: 120,
                    write_count: 40,
                }),
            }),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_cpu_usage(&self, usage: f32) {
        self.cpu.lock().overall_usage = usage;
    }

    pub fn set_memory_percent(&self, percent: f32) {
        self.memory.lock().percent = percent;
    }

    pub fn set_temperature(&self, celsius: f32) {
        self.temperature.lock().cpu_temp = celsius;
    }

    pub fn set_disk(&self, disk: DiskMetrics) {
        *self.disk.lock() = disk;
    }

    pub fn fail_with(&self, err: Option<SourceError>) {
        *self.failure.lock() = err;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SystemSource for StubSystem {
    async fn cpu(&self) -> Result<CpuMetrics, SourceError> {
        self.check()?;
        Ok(self.cpu.lock().clone())
    }

    async fn memory(&self) -> Result<MemoryMetrics, SourceError> {
        self.check()?;
        Ok(self.memory.lock().clone())
    }

    async fn temperature(&self) -> Result<TemperatureMetrics, SourceError> {
        self.check()?;
        Ok(self.temperature.lock().clone())
    }

    async fn network(&self) -> Result<NetworkMetrics, SourceError> {
        self.check()?;
        Ok(NetworkMetrics::default())
    }

    async fn disk(&self) -> Result<DiskMetrics, SourceError> {
        self.check()?;
        Ok(self.disk.lock().clone())
    }
}

/// Scripted USB bus.
#[derive(Default)]
pub struct StubUsb {
    devices: Mutex<Vec<UsbDevice>>,
    failure: Mutex<Option<SourceError>>,
}

impl StubUsb {
    pub fn with_devices(devices: Vec<UsbDevice>) -> Self {
        Self {
            devices: Mutex::new(devices),
            failure: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, err: Option<SourceError>) {
        *self.failure.lock() = err;
    }
}

#[async_trait]
impl UsbSource for StubUsb {
    async fn devices(&self) -> Result<Vec<UsbDevice>, SourceError> {
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        Ok(self.devices.lock().clone())
    }
}

/// Container with the given name and state (`running`, `exited`...).
pub fn container(id: &str, name: &str, state: &str) -> ContainerInfo {
    ContainerInfo {
        id: id.into(),
        name: name.into(),
        image: format!("{name}:latest"),
        status: if state == "running" { "Up 2 hours".into() } else { "Exited (0) 1 hour ago".into() },
        state: state.into(),
        ports: String::new(),
        created: "2024-05-01 10:00:00 +0000 UTC".into(),
    }
}

/// Scripted container runtime. Records every control action.
#[derive(Default)]
pub struct StubContainers {
    containers: Mutex<Vec<ContainerInfo>>,
    stats: Mutex<HashMap<String, ContainerStats>>,
    failure: Mutex<Option<SourceError>>,
    actions: Mutex<Vec<(String, ContainerAction)>>,
}

impl StubContainers {
    pub fn with_containers(containers: Vec<ContainerInfo>) -> Self {
        Self {
            containers: Mutex::new(containers),
            ..Default::default()
        }
    }

    /// Every call answers `Unavailable`, like a host without docker.
    pub fn unavailable() -> Self {
        let stub = Self::default();
        stub.fail_with(Some(SourceError::Unavailable("Docker not available".into())));
        stub
    }

    pub fn set_stats(&self, id: &str, stats: ContainerStats) {
        self.stats.lock().insert(id.to_string(), stats);
    }

    pub fn fail_with(&self, err: Option<SourceError>) {
        *self.failure.lock() = err;
    }

    pub fn actions(&self) -> Vec<(String, ContainerAction)> {
        self.actions.lock().clone()
    }

    fn check(&self) -> Result<(), SourceError> {
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for StubContainers {
    async fn list(&self) -> Result<Vec<ContainerInfo>, SourceError> {
        self.check()?;
        Ok(self.containers.lock().clone())
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats, SourceError> {
        self.check()?;
        self.stats
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::Command {
                command: format!("docker stats {id}"),
                reason: "no such container".into(),
            })
    }

    async fn control(&self, id: &str, action: ContainerAction) -> Result<(), SourceError> {
        self.check()?;
        let mut containers = self.containers.lock();
        let Some(container) = containers.iter_mut().find(|c| c.id == id || c.name == id) else {
            return Err(SourceError::Command {
                command: format!("docker {} {id}", action.as_str()),
                reason: format!("No such container: {id}"),
            });
        };
        container.state = match action {
            ContainerAction::Stop => "exited".into(),
            ContainerAction::Start | ContainerAction::Restart => "running".into(),
        };
        self.actions.lock().push((id.to_string(), action));
        Ok(())
    }
}
