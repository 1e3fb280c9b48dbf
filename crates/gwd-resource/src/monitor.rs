use std::sync::{Arc, RwLock};
use std::time::Duration;

use sysinfo::System;
use tracing::warn;

/// Sampling cadence for system-wide CPU/memory load (spec §4.1 default).
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// A single load reading plus the timeout multiplier it implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Load {
    pub cpu_pct: f32,
    pub mem_pct: f32,
    pub multiplier: f64,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            cpu_pct: 0.0,
            mem_pct: 0.0,
            multiplier: 1.0,
        }
    }
}

/// Piecewise multiplier used to stretch timeouts under resource pressure
/// (spec §4.1): `<=60% -> 1.0`, `60-80% -> 1.5`, `80-95% -> 2.0`, `>95% -> 3.0`.
/// The higher of the two (cpu, mem) readings drives the multiplier.
pub fn multiplier_for(cpu_pct: f32, mem_pct: f32) -> f64 {
    let load = cpu_pct.max(mem_pct);
    if load > 95.0 {
        3.0
    } else if load > 80.0 {
        2.0
    } else if load > 60.0 {
        1.5
    } else {
        1.0
    }
}

/// Samples system-wide CPU and memory load on a fixed cadence in a
/// background task, the same "background task polling sysinfo, cache last
/// good value" shape as `csa-resource::monitor::MemoryMonitor`, generalized
/// from a single PID to the whole system per spec §4.1.
pub struct ResourceMonitor {
    cache: Arc<RwLock<Load>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl ResourceMonitor {
    /// Spawn the sampling task. Sampling failures are non-fatal: the last
    /// good value is reused, and if none has ever been observed,
    /// `multiplier` defaults to `1.0`.
    pub fn start() -> Self {
        let cache = Arc::new(RwLock::new(Load::default()));
        let task_cache = Arc::clone(&cache);

        let handle = tokio::spawn(async move {
            let mut sys = System::new();
            loop {
                tokio::time::sleep(SAMPLE_INTERVAL).await;
                sys.refresh_cpu_usage();
                sys.refresh_memory();

                let cpu_pct = sys.global_cpu_usage();
                let total = sys.total_memory();
                let mem_pct = if total > 0 {
                    (sys.used_memory() as f64 / total as f64 * 100.0) as f32
                } else {
                    warn!("resource monitor: total memory reported as zero, skipping sample");
                    continue;
                };

                let load = Load {
                    cpu_pct,
                    mem_pct,
                    multiplier: multiplier_for(cpu_pct, mem_pct),
                };

                match task_cache.write() {
                    Ok(mut guard) => *guard = load,
                    Err(_) => warn!("resource monitor: cache lock poisoned, dropping sample"),
                }
            }
        });

        Self {
            cache,
            _handle: handle,
        }
    }

    /// Return the most recently sampled load, never blocking on I/O.
    pub fn current_load(&self) -> Load {
        self.cache.read().map(|g| *g).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_boundaries() {
        assert_eq!(multiplier_for(0.0, 0.0), 1.0);
        assert_eq!(multiplier_for(60.0, 0.0), 1.0);
        assert_eq!(multiplier_for(60.1, 0.0), 1.5);
        assert_eq!(multiplier_for(80.0, 0.0), 1.5);
        assert_eq!(multiplier_for(80.1, 0.0), 2.0);
        assert_eq!(multiplier_for(95.0, 0.0), 2.0);
        assert_eq!(multiplier_for(95.1, 0.0), 3.0);
    }

    #[test]
    fn multiplier_uses_higher_of_cpu_and_mem() {
        assert_eq!(multiplier_for(10.0, 97.0), 3.0);
        assert_eq!(multiplier_for(97.0, 10.0), 3.0);
    }

    #[tokio::test]
    async fn monitor_defaults_to_unit_multiplier_before_first_sample() {
        let monitor = ResourceMonitor::start();
        let load = monitor.current_load();
        assert_eq!(load.multiplier, 1.0);
    }
}
