/**
 * COLLECTORS - Les six unités de collecte et leur politique de TTL
 *
 * ROLE:
 * Each collector owns one external source (behind a trait object) and
 * publishes one or more store keys per tick. TTLs are expressed as multiples
 * of the collector's own interval so a slower cadence automatically widens
 * the freshness window.
 *
 * CADENCES PAR DEFAUT:
 * fast 2s, disk 10s, usb 15s, containers 5s, health 5s, dongle 5s,
 * staggered 0.1s → 0.6s in that order.
 */

mod containers;
mod disk;
mod dongle;
mod fast;
mod health;
mod usb;

pub use containers::ContainersCollector;
pub use disk::DiskCollector;
pub use dongle::DongleCollector;
pub use fast::FastCollector;
pub use health::HealthCollector;
pub use usb::UsbCollector;

use crate::scheduler::Schedule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll intervals in seconds, one per collector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intervals {
    pub fast: f64,
    pub disk: f64,
    pub usb: f64,
    pub containers: f64,
    pub health: f64,
    pub dongle: f64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            fast: 2.0,
            disk: 10.0,
            usb: 15.0,
            containers: 5.0,
            health: 5.0,
            dongle: 5.0,
        }
    }
}

impl Intervals {
    pub fn fast(&self) -> Schedule {
        schedule(self.fast, 100)
    }

    pub fn disk(&self) -> Schedule {
        schedule(self.disk, 200)
    }

    pub fn usb(&self) -> Schedule {
        schedule(self.usb, 300)
    }

    pub fn containers(&self) -> Schedule {
        schedule(self.containers, 400)
    }

    pub fn health(&self) -> Schedule {
        schedule(self.health, 500)
    }

    pub fn dongle(&self) -> Schedule {
        schedule(self.dongle, 600)
    }
}

/// Longest accepted poll interval, one day.
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;

/// Non-positive or non-finite intervals fall back to one second, longer ones
/// are capped at [`MAX_INTERVAL_SECS`].
fn schedule(secs: f64, stagger_ms: u64) -> Schedule {
    let secs = if secs.is_finite() && secs > 0.0 {
        secs.min(MAX_INTERVAL_SECS)
    } else {
        1.0
    };
    Schedule::new(Duration::from_secs_f64(secs), Duration::from_millis(stagger_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadences() {
        let intervals = Intervals::default();
        assert_eq!(intervals.fast().interval, Duration::from_secs(2));
        assert_eq!(intervals.usb().interval, Duration::from_secs(15));
        assert_eq!(intervals.dongle().stagger, Duration::from_millis(600));
    }

    #[test]
    fn absurd_interval_is_capped() {
        let intervals = Intervals {
            disk: 5e18,
            ..Default::default()
        };
        let disk = intervals.disk();
        assert_eq!(disk.interval, Duration::from_secs(86_400));
        assert_eq!(disk.ttl(6.0), Duration::from_secs(6 * 86_400));
    }

    #[test]
    fn bogus_interval_falls_back() {
        let intervals = Intervals {
            disk: 0.0,
            usb: f64::NAN,
            ..Default::default()
        };
        assert_eq!(intervals.disk().interval, Duration::from_secs(1));
        assert_eq!(intervals.usb().interval, Duration::from_secs(1));
    }
}
