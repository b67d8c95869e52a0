//! Host telemetry via sysinfo
//!
//! Provides:
//! - CPU usage (overall, per core), frequency and load averages
//! - Memory and swap usage
//! - CPU temperature (thermal zone, then hardware components)
//! - Network interface counters and addresses
//! - Disk usage for real (non-pseudo) filesystems, root first, plus block I/O totals
//!
//! Only CPU and memory share the `System` handle. Disk, network and sensor
//! walks run on their own blocking threads without it, so a hung mount never
//! holds up the CPU/memory sampling of the fast collector.

use super::SystemSource;
use crate::error::SourceError;
use async_trait::async_trait;
use if_addrs::IfAddr;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use sysinfo::{Components, Disks, Networks, System};
use tracing::debug;

const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";
const DISKSTATS: &str = "/proc/diskstats";
const SECTOR_SIZE: u64 = 512;

const PSEUDO_FS: &[&str] = &[
    "proc", "sysfs", "tmpfs", "devtmpfs", "cgroup", "cgroup2", "overlay", "squashfs", "nsfs", "mqueue", "autofs",
    "securityfs", "pstore", "debugfs", "tracefs", "fusectl", "rpc_pipefs", "configfs", "devpts", "bpf",
    "binfmt_misc",
];

/// CPU usage metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub overall_usage: f32,
    pub per_core_usage: Vec<f32>,
    /// MHz
    pub current_frequency: u64,
    pub load_average: LoadAverage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    #[serde(rename = "1_min")]
    pub one: f64,
    #[serde(rename = "5_min")]
    pub five: f64,
    #[serde(rename = "15_min")]
    pub fifteen: f64,
}

/// Memory usage metrics, bytes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub percent: f32,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_percent: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureMetrics {
    pub cpu_temp: f32,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub interfaces: Vec<NetworkInterfaceStats>,
}

/// Per-interface network statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceStats {
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    #[serde(default)]
    pub addresses: Vec<InterfaceAddress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InterfaceAddress {
    IPv4 { address: String, netmask: String },
    IPv6 { address: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub filesystems: Vec<Filesystem>,
    /// `None` when `/proc/diskstats` cannot be read.
    #[serde(default)]
    pub io_stats: Option<DiskIoStats>,
}

/// Block I/O totals over whole disks since boot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskIoStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_count: u64,
    pub write_count: u64,
}

/// Usage of one mounted filesystem, bytes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filesystem {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f32,
}

/// sysinfo-backed reader. Keeps one `System` across calls so CPU usage is a
/// delta between consecutive refreshes.
#[derive(Clone)]
pub struct SysinfoReader {
    sys: Arc<Mutex<System>>,
}

impl Default for SysinfoReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoReader {
    /// Primes the CPU counters so the first tick has a baseline.
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        Self {
            sys: Arc::new(Mutex::new(sys)),
        }
    }

    /// Runs `f` against the shared `System` on a blocking thread.
    async fn sampled<T, F>(&self, f: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut System) -> T + Send + 'static,
    {
        let sys = self.sys.clone();
        offload(move || f(&mut sys.lock())).await
    }
}

async fn offload<T, F>(f: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SourceError::Io(format!("sampling task failed: {e}")))
}

#[async_trait]
impl SystemSource for SysinfoReader {
    async fn cpu(&self) -> Result<CpuMetrics, SourceError> {
        self.sampled(|sys| {
            sys.refresh_cpu();
            let load = System::load_average();
            CpuMetrics {
                overall_usage: sys.global_cpu_info().cpu_usage(),
                per_core_usage: sys.cpus().iter().map(|c| c.cpu_usage()).collect(),
                current_frequency: sys.cpus().first().map(|c| c.frequency()).unwrap_or(0),
                load_average: LoadAverage {
                    one: load.one,
                    five: load.five,
                    fifteen: load.fifteen,
                },
            }
        })
        .await
    }

    async fn memory(&self) -> Result<MemoryMetrics, SourceError> {
        self.sampled(|sys| {
            sys.refresh_memory();
            let total = sys.total_memory();
            let available = sys.available_memory();
            let used = total.saturating_sub(available);
            MemoryMetrics {
                total,
                used,
                available,
                percent: percent(used, total),
                swap_total: sys.total_swap(),
                swap_used: sys.used_swap(),
                swap_percent: percent(sys.used_swap(), sys.total_swap()),
            }
        })
        .await
    }

    async fn temperature(&self) -> Result<TemperatureMetrics, SourceError> {
        if let Ok(raw) = tokio::fs::read_to_string(THERMAL_ZONE).await {
            if let Some(cpu_temp) = parse_thermal_zone(&raw) {
                return Ok(TemperatureMetrics {
                    cpu_temp,
                    unit: "C".into(),
                    error: None,
                });
            }
        }

        offload(|| {
            let components = Components::new_with_refreshed_list();
            let reading = components.iter().map(|c| c.temperature()).find(|t| *t > 0.0);
            match reading {
                Some(cpu_temp) => TemperatureMetrics {
                    cpu_temp,
                    unit: "C".into(),
                    error: None,
                },
                None => TemperatureMetrics {
                    cpu_temp: 0.0,
                    unit: "C".into(),
                    error: Some("Temperature sensor not found".into()),
                },
            }
        })
        .await
    }

    async fn network(&self) -> Result<NetworkMetrics, SourceError> {
        offload(|| {
            let networks = Networks::new_with_refreshed_list();
            let mut addresses = match if_addrs::get_if_addrs() {
                Ok(list) => group_addresses(list),
                Err(e) => {
                    debug!("Cannot enumerate interface addresses: {}", e);
                    Default::default()
                }
            };
            let mut metrics = NetworkMetrics::default();
            for (name, data) in networks.iter() {
                let iface = NetworkInterfaceStats {
                    name: name.clone(),
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    packets_sent: data.total_packets_transmitted(),
                    packets_recv: data.total_packets_received(),
                    addresses: addresses.remove(name).unwrap_or_default(),
                };
                metrics.bytes_sent += iface.bytes_sent;
                metrics.bytes_recv += iface.bytes_recv;
                metrics.packets_sent += iface.packets_sent;
                metrics.packets_recv += iface.packets_recv;
                metrics.interfaces.push(iface);
            }
            // interfaces with an address but no counters (rare, e.g. some tunnels)
            metrics.interfaces.extend(addresses.into_iter().map(|(name, addresses)| NetworkInterfaceStats {
                name,
                addresses,
                ..Default::default()
            }));
            metrics.interfaces.sort_by(|a, b| a.name.cmp(&b.name));
            metrics
        })
        .await
    }

    async fn disk(&self) -> Result<DiskMetrics, SourceError> {
        offload(|| {
            let disks = Disks::new_with_refreshed_list();
            let mut seen = HashSet::new();
            let mut filesystems = Vec::new();
            for disk in disks.iter() {
                let fstype = disk.file_system().to_string_lossy().to_string();
                let mountpoint = disk.mount_point().to_string_lossy().to_string();
                if PSEUDO_FS.contains(&fstype.as_str()) || is_noise_mount(&mountpoint) {
                    continue;
                }
                if !seen.insert(mountpoint.clone()) {
                    continue;
                }
                let total = disk.total_space();
                let free = disk.available_space();
                let used = total.saturating_sub(free);
                filesystems.push(Filesystem {
                    device: disk.name().to_string_lossy().to_string(),
                    mountpoint,
                    fstype,
                    total,
                    used,
                    free,
                    percent: percent(used, total),
                });
            }
            sort_filesystems(&mut filesystems);
            debug!("Collected {} filesystems", filesystems.len());
            let io_stats = match std::fs::read_to_string(DISKSTATS) {
                Ok(raw) => Some(parse_diskstats(&raw, |name| Path::new("/sys/block").join(name).exists())),
                Err(e) => {
                    debug!("Cannot read {}: {}", DISKSTATS, e);
                    None
                }
            };
            DiskMetrics { filesystems, io_stats }
        })
        .await
    }
}

fn percent(part: u64, total: u64) -> f32 {
    if total > 0 {
        ((part as f64 / total as f64) * 1000.0).round() as f32 / 10.0
    } else {
        0.0
    }
}

/// Thermal zones report millidegrees.
fn parse_thermal_zone(raw: &str) -> Option<f32> {
    raw.trim().parse::<f32>().ok().map(|milli| milli / 1000.0)
}

/// Sums `/proc/diskstats` rows for which `is_disk` holds, so partitions are
/// not counted twice.
fn parse_diskstats(raw: &str, is_disk: impl Fn(&str) -> bool) -> DiskIoStats {
    let mut io = DiskIoStats::default();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || !is_disk(fields[2]) {
            continue;
        }
        let num = |i: usize| fields[i].parse::<u64>().unwrap_or(0);
        io.read_count += num(3);
        io.read_bytes += num(5) * SECTOR_SIZE;
        io.write_count += num(7);
        io.write_bytes += num(9) * SECTOR_SIZE;
    }
    io
}

fn group_addresses(list: Vec<if_addrs::Interface>) -> HashMap<String, Vec<InterfaceAddress>> {
    let mut by_name: HashMap<String, Vec<InterfaceAddress>> = HashMap::new();
    for iface in list {
        let address = match iface.addr {
            IfAddr::V4(v4) => InterfaceAddress::IPv4 {
                address: v4.ip.to_string(),
                netmask: v4.netmask.to_string(),
            },
            IfAddr::V6(v6) => InterfaceAddress::IPv6 {
                address: v6.ip.to_string(),
            },
        };
        by_name.entry(iface.name).or_default().push(address);
    }
    by_name
}

fn is_noise_mount(mountpoint: &str) -> bool {
    matches!(mountpoint, "/etc/hosts" | "/etc/hostname" | "/etc/resolv.conf")
        || mountpoint.starts_with("/proc")
        || mountpoint.starts_with("/sys")
        || (mountpoint.starts_with("/dev") && !mountpoint.starts_with("/dev/disk"))
}

/// Root first, boot partitions last, block devices before others, larger
/// volumes earlier. Dashboards show `filesystems[0]` as the main disk.
fn sort_filesystems(filesystems: &mut [Filesystem]) {
    filesystems.sort_by_key(|fs| {
        let rank = if fs.mountpoint == "/" {
            0
        } else if fs.mountpoint == "/boot" || Path::new(&fs.mountpoint).starts_with("/boot") {
            2
        } else {
            1
        };
        let block = if fs.device.starts_with("/dev/") { 0 } else { 1 };
        (rank, block, std::cmp::Reverse(fs.total), fs.mountpoint.clone())
    });
}
