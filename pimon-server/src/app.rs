//! Process wiring: sources → collectors → scheduler, and the HTTP state.

use crate::config::Config;
use crate::http::AppState;
use anyhow::{Context, Result};
use pimon_core::collectors::{
    ContainersCollector, DiskCollector, DongleCollector, FastCollector, HealthCollector, UsbCollector,
};
use pimon_core::sources::docker::DockerCli;
use pimon_core::sources::mailer::SmtpMailer;
use pimon_core::sources::modem::HilinkModem;
use pimon_core::sources::system::SysinfoReader;
use pimon_core::sources::usb::LsusbReader;
use pimon_core::sources::{ContainerRuntime, Mailer, ModemClient, SystemSource, UsbSource};
use pimon_core::{Collector, History, Scheduler, Store};
use std::sync::Arc;
use tracing::info;

/// Every external source the collectors and action routes use.
#[derive(Clone)]
pub struct Sources {
    pub system: Arc<dyn SystemSource>,
    pub usb: Arc<dyn UsbSource>,
    pub containers: Arc<dyn ContainerRuntime>,
    pub modem: Option<Arc<dyn ModemClient>>,
    pub mailer: Arc<dyn Mailer>,
}

impl Sources {
    /// Real host, docker CLI, HiLink modem and SMTP.
    pub fn real(config: &Config) -> Result<Self> {
        let modem: Option<Arc<dyn ModemClient>> = if config.modem.enabled {
            let modem = HilinkModem::new(&config.modem.host)
                .with_context(|| format!("cannot build modem client for {}", config.modem.host))?;
            Some(Arc::new(modem))
        } else {
            info!("Modem disabled in config");
            None
        };
        Ok(Self {
            system: Arc::new(SysinfoReader::new()),
            usb: Arc::new(LsusbReader::default()),
            containers: Arc::new(DockerCli::new(config.docker.program.clone())),
            modem,
            mailer: Arc::new(SmtpMailer::new()),
        })
    }
}

/// Builds the six collectors, starts them, and returns the scheduler with
/// the matching HTTP state.
pub fn start(config: &Config, sources: Sources) -> (Scheduler, AppState) {
    let store = Store::new();
    let intervals = config.intervals;

    let dongle = Arc::new(DongleCollector::new(
        sources.modem.clone(),
        sources.mailer.clone(),
        config.smtp.clone(),
        intervals.dongle(),
    ));
    let collectors: Vec<Arc<dyn Collector>> = vec![
        Arc::new(FastCollector::new(sources.system.clone(), History::new(), intervals.fast())),
        Arc::new(DiskCollector::new(sources.system.clone(), intervals.disk())),
        Arc::new(UsbCollector::new(sources.usb.clone(), intervals.usb())),
        Arc::new(ContainersCollector::new(sources.containers.clone(), intervals.containers())),
        Arc::new(HealthCollector::new(intervals.health())),
        dongle.clone(),
    ];

    let scheduler = Scheduler::start(store.clone(), collectors);
    info!("Started collectors: {}", scheduler.collector_names().join(", "));

    let state = AppState {
        store,
        board: scheduler.status_board(),
        containers: sources.containers,
        dongle,
        api_key: config.http.api_key.clone(),
    };
    (scheduler, state)
}
