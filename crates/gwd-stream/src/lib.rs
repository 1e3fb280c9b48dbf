pub mod binary;
pub mod pump;
pub mod watchdog;

pub use binary::{DEFAULT_BINARY_THRESHOLD, redact_if_binary};
pub use pump::{PumpConfig, PumpHandles, drain, run_pump};
pub use watchdog::stall_watchdog;
