/*!
# PiMon DevKit - Sources simulées pour les tests

Lets collectors run without hardware, a docker daemon or an LTE dongle:
- scripted host telemetry, USB bus and container runtime
- an in-memory modem whose inbox reacts to mark-read / delete
- a recording mailer that can be told to fail
- a harness bundling a store, a history buffer and the default schedules
*/

pub mod modem_stub;
pub mod source_stubs;
pub mod test_utils;

pub use modem_stub::{sms, StubMailer, StubModem};
pub use source_stubs::{container, StubContainers, StubSystem, StubUsb};
pub use test_utils::{init_test_logging, TestHarness};
