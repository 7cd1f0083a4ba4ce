//! Scheduler configuration.
//!
//! All scheduling constants live here so a run can be tuned from a TOML file without
//! rebuilding. Missing keys fall back to the defaults below.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Optional features the radio supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Capabilities {
    /// Peer-to-peer links (GO presence tracking, P2P channel priority).
    pub p2p: bool,
    /// P2P group owner (NOA insertion when a GO shares the radio with a station link).
    pub p2p_go: bool,
    /// Power-save coordination (presence/absence frames, sleep prevention while scanning).
    pub power_save: bool,
    /// Hardware scan with channel occupancy survey.
    pub hw_scan: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            p2p: true,
            p2p_go: true,
            power_save: true,
            hw_scan: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Duration of one slot of airtime in microseconds.
    pub slot_duration_us: u32,
    /// Number of traffic channel contexts in the pool.
    pub traffic_contexts: u8,
    /// Capacity of the virtual interface table.
    pub max_vifs: u8,
    /// Baseline number of slots per linked interface per distribution event.
    pub vif_slots: u16,
    /// Length of one beacon-presence window in slots.
    pub tbtt_presence_slots: u16,
    /// Minimum presence on a channel, in slots, worth a switch.
    pub min_presence_slots: u16,
    /// Timeout of a go-idle or absence-confirmation phase.
    pub switch_timeout_us: u32,
    /// Delay applied to host scan / remain-on-channel requests.
    pub arbitration_delay_us: u32,
    /// The radio starts moving this long before a TBTT.
    pub tbtt_switch_advance_us: u32,
    /// A TBTT closer than this is acted on immediately instead of arming a timer.
    pub min_timer_us: u32,
    /// Saturation value of a TBTT entry priority.
    pub tbtt_priority_max: u8,
    /// Beacon detection lasts one beacon interval minus this margin.
    pub beacon_detect_margin_us: u32,
    pub capabilities: Capabilities,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slot_duration_us: 1024,
            traffic_contexts: 3,
            max_vifs: 4,
            vif_slots: 40,
            tbtt_presence_slots: 5,
            min_presence_slots: 5,
            switch_timeout_us: 5000,
            arbitration_delay_us: 10000,
            tbtt_switch_advance_us: 2000,
            min_timer_us: 150,
            tbtt_priority_max: 15,
            beacon_detect_margin_us: 5000,
            capabilities: Capabilities::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Returns
    /// * `Ok(SchedulerConfig)` if the file was read, parsed and validated
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let config: SchedulerConfig = toml::from_str(content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.slot_duration_us == 0 {
            return Err("slot-duration-us must be positive".to_string());
        }
        if self.traffic_contexts == 0 {
            return Err("traffic-contexts must be at least 1".to_string());
        }
        if self.traffic_contexts > u8::MAX - 2 {
            return Err(format!("traffic-contexts {} leaves no room for the scan and remain-on-channel contexts", self.traffic_contexts));
        }
        if self.max_vifs == 0 {
            return Err("max-vifs must be at least 1".to_string());
        }
        if self.tbtt_presence_slots == 0 {
            return Err("tbtt-presence-slots must be positive".to_string());
        }
        if self.tbtt_presence_slots > self.vif_slots {
            return Err(format!(
                "tbtt-presence-slots {} exceeds the per-interface allocation vif-slots {}",
                self.tbtt_presence_slots, self.vif_slots
            ));
        }
        if self.vif_slots as u32 * self.max_vifs as u32 > u16::MAX as u32 {
            return Err(format!(
                "vif-slots {} for {} interfaces does not fit one distribution event of {} slots",
                self.vif_slots,
                self.max_vifs,
                u16::MAX
            ));
        }
        if self.switch_timeout_us == 0 {
            return Err("switch-timeout-us must be positive".to_string());
        }
        Ok(())
    }

    pub fn slot(&self) -> Duration {
        Duration::from_micros(self.slot_duration_us as u64)
    }

    /// Airtime covered by `count` slots.
    pub fn slots(&self, count: u16) -> Duration {
        Duration::from_micros(self.slot_duration_us as u64 * count as u64)
    }

    /// Number of whole slots in `duration`, saturated to `u16`.
    pub fn slots_in(&self, duration: Duration) -> u16 {
        let slots = duration.as_micros() / self.slot_duration_us as u64;
        slots.min(u16::MAX as u64) as u16
    }

    pub fn presence_window(&self) -> Duration {
        self.slots(self.tbtt_presence_slots)
    }

    pub fn switch_timeout(&self) -> Duration {
        Duration::from_micros(self.switch_timeout_us as u64)
    }

    pub fn arbitration_delay(&self) -> Duration {
        Duration::from_micros(self.arbitration_delay_us as u64)
    }

    pub fn tbtt_switch_advance(&self) -> Duration {
        Duration::from_micros(self.tbtt_switch_advance_us as u64)
    }

    pub fn min_timer(&self) -> Duration {
        Duration::from_micros(self.min_timer_us as u64)
    }

    pub fn beacon_detect_margin(&self) -> Duration {
        Duration::from_micros(self.beacon_detect_margin_us as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slot(), Duration::from_micros(1024));
        assert_eq!(config.presence_window(), Duration::from_micros(5 * 1024));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SchedulerConfig::from_toml_str(
            r#"
slot-duration-us = 512
vif-slots = 20

[capabilities]
p2p = false
"#,
        )
        .unwrap();
        assert_eq!(config.slot_duration_us, 512);
        assert_eq!(config.vif_slots, 20);
        assert_eq!(config.traffic_contexts, 3);
        assert!(!config.capabilities.p2p);
        assert!(config.capabilities.hw_scan);
    }

    #[test]
    fn rejects_presence_longer_than_allocation() {
        let err = SchedulerConfig::from_toml_str("vif-slots = 3").unwrap_err();
        assert!(err.contains("tbtt-presence-slots"), "unexpected error: {}", err);
    }

    #[test]
    fn rejects_event_longer_than_slot_counter() {
        let err = SchedulerConfig::from_toml_str("vif-slots = 30000").unwrap_err();
        assert!(err.contains("distribution event"), "unexpected error: {}", err);
        assert!(SchedulerConfig::from_toml_str("vif-slots = 16383").is_ok());
    }

    #[test]
    fn rejects_unknown_syntax() {
        assert!(SchedulerConfig::from_toml_str("slot-duration-us = \"fast\"").is_err());
        assert!(SchedulerConfig::from_toml_str("slot-duration-us = 0").is_err());
    }

    #[test]
    fn slot_conversions_saturate() {
        let config = SchedulerConfig::default();
        assert_eq!(config.slots_in(Duration::from_micros(10 * 1024 + 1000)), 10);
        assert_eq!(config.slots_in(Duration::from_secs(1_000_000)), u16::MAX);
    }
}
