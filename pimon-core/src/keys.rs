//! Store key namespace. Stable across restarts, never persisted.

pub const KEY_CPU: &str = "metrics.cpu";
pub const KEY_MEMORY: &str = "metrics.memory";
pub const KEY_TEMP: &str = "metrics.temperature";
pub const KEY_DISK: &str = "metrics.disk";
pub const KEY_NETWORK: &str = "metrics.network";
pub const KEY_SUMMARY: &str = "metrics.summary";
pub const KEY_HISTORY: &str = "metrics.history";
pub const KEY_USB: &str = "usb.devices";
pub const KEY_DOCKER: &str = "docker.containers";
pub const KEY_DONGLE: &str = "dongle.status";
pub const KEY_SMS_FORWARDER: &str = "dongle.sms_forwarder";
pub const KEY_HEALTH: &str = "health.status";

/// Every key, in the order the cache status view lists them.
pub const ALL_KEYS: [&str; 12] = [
    KEY_CPU,
    KEY_MEMORY,
    KEY_TEMP,
    KEY_DISK,
    KEY_NETWORK,
    KEY_SUMMARY,
    KEY_HISTORY,
    KEY_USB,
    KEY_DOCKER,
    KEY_DONGLE,
    KEY_SMS_FORWARDER,
    KEY_HEALTH,
];
