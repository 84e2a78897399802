//! System metrics collection

use sysinfo::System;

use anchor_protocol::DeviceStats;

/// Anything that can describe the device's current load
pub trait MetricsSource: Send {
    /// Take a fresh sample
    fn sample(&mut self) -> DeviceStats;
}

/// Host metrics read through sysinfo
pub struct SystemMetrics {
    system: System,
    user_agent: String,
}

impl SystemMetrics {
    /// Create a collector and prime the CPU counters
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes
        system.refresh_cpu_usage();
        system.refresh_memory();

        let os = System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string());
        Self {
            system,
            user_agent: format!("AnchorAgent/{} ({})", env!("CARGO_PKG_VERSION"), os),
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SystemMetrics {
    fn sample(&mut self) -> DeviceStats {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        DeviceStats {
            ua: Some(self.user_agent.clone()),
            cpu: Some(self.system.global_cpu_usage()),
            mem_used: Some(self.system.used_memory()),
            mem_total: Some(self.system.total_memory()),
            ..DeviceStats::default()
        }
    }
}
