pub mod monitor;

pub use monitor::{Load, ResourceMonitor, multiplier_for};
