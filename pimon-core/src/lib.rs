//! PiMon core - continuously-refreshed observation cache
//!
//! Independent background collectors poll slow or flaky sources (host
//! telemetry, USB bus, container runtime, LTE modem) on their own cadence and
//! publish into a shared [`Store`]. Readers only ever take snapshots, they
//! never trigger a poll:
//! - [`store`]: time-bounded entries (fresh / stale / expired)
//! - [`history`]: bounded rolling buffer of summary points
//! - [`scheduler`]: one task per collector, cooperative shutdown
//! - [`collectors`]: the six collectors and their TTL policy
//! - [`forwarding`]: SMS-to-email forwarding state machine
//! - [`http_cache`]: freshness metadata to `Cache-Control`
//! - [`sources`]: boundary traits for external readers + real implementations

pub mod collectors;
pub mod error;
pub mod forwarding;
pub mod health;
pub mod history;
pub mod http_cache;
pub mod keys;
pub mod scheduler;
pub mod sources;
mod state;
pub mod store;

pub use error::SourceError;
pub use history::{History, HistoryPoint, HISTORY_CAPACITY};
pub use scheduler::{Collector, CollectorStatus, Schedule, Scheduler, StatusBoard};
pub use store::{EntryMeta, Snapshot, Store};
