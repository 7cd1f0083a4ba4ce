//! Scenario loading and validation.
//!
//! A scenario describes the interfaces sharing the simulated radio, the hardware timing
//! model and a list of timed host requests. Interfaces are referred to by name.

use anyhow::Context;
use embassy_time::Duration;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::chan::{Band, ChannelParams, SchedulerConfig, VifKind};

/// Root structure of a scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Length of the run in virtual milliseconds.
    pub duration_ms: u64,
    /// Virtual clock speed, 100 = real time.
    #[serde(default = "default_speed_percent")]
    pub speed_percent: u32,
    /// Seed for traffic sampling and beacon jitter.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub hardware: HardwareModel,
    /// Standard deviation of the beacon reception delay after its TBTT.
    #[serde(default)]
    pub beacon_jitter_us: f64,
    pub interfaces: Vec<InterfaceSpec>,
    #[serde(default)]
    pub requests: Vec<TimedRequest>,
}

fn default_speed_percent() -> u32 {
    100
}

/// Latencies and measurements of the simulated radio.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareModel {
    /// Time for the MAC to reach idle after a request.
    pub go_idle_us: u64,
    /// Time until a null frame is confirmed.
    pub null_frame_cfm_us: u64,
    /// Time from beacon reception until the presence it opened is over.
    pub beacon_duration_us: u64,
    /// Share of airtime the CCA reports busy while scanning.
    pub cca_busy_percent: u8,
    pub noise_floor_dbm: Option<i8>,
    /// Stations are in power save, so absence needs no announcement.
    pub stations_in_power_save: bool,
}

impl Default for HardwareModel {
    fn default() -> Self {
        Self {
            go_idle_us: 200,
            null_frame_cfm_us: 300,
            beacon_duration_us: 1000,
            cca_busy_percent: 0,
            noise_floor_dbm: None,
            stations_in_power_save: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceSpec {
    pub name: String,
    pub kind: VifKind,
    #[serde(default)]
    pub p2p: bool,
    #[serde(default = "default_beacon_interval_us")]
    pub beacon_interval_us: u64,
    /// Offset of the first beacon from the start of the run.
    #[serde(default)]
    pub first_tbtt_us: u64,
    pub channel: ChannelParams,
    /// Probability that traffic is detected during one distribution event.
    #[serde(default)]
    pub traffic_probability: f64,
    #[serde(default)]
    pub link_at_ms: u64,
    #[serde(default)]
    pub unlink_at_ms: Option<u64>,
    /// Associated (station) or started (access point) when linked.
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub peer_ap: Option<u8>,
    /// Regulatory transmit power limit.
    #[serde(default)]
    pub tx_power: Option<i8>,
    #[serde(default)]
    pub user_tx_power: Option<i8>,
}

fn default_beacon_interval_us() -> u64 {
    102_400
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimedRequest {
    pub at_ms: u64,
    #[serde(flatten)]
    pub request: RequestKind,
}

/// Host requests a scenario can issue.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    Scan {
        interface: String,
        #[serde(default)]
        band: Band,
        freq: u16,
        duration_ms: u64,
        #[serde(default)]
        tx_power: i8,
    },
    RemainOnChannel {
        interface: String,
        channel: ChannelParams,
        duration_ms: u64,
    },
    CancelRemainOnChannel,
    BeaconDetection {
        interface: String,
    },
    UpdateChannel {
        interface: String,
        channel: ChannelParams,
    },
    GoPresence {
        interface: String,
        present: bool,
    },
    SetActive {
        interface: String,
        active: bool,
    },
}

impl RequestKind {
    fn interface(&self) -> Option<&str> {
        match self {
            RequestKind::Scan { interface, .. }
            | RequestKind::RemainOnChannel { interface, .. }
            | RequestKind::BeaconDetection { interface }
            | RequestKind::UpdateChannel { interface, .. }
            | RequestKind::GoPresence { interface, .. }
            | RequestKind::SetActive { interface, .. } => Some(interface),
            RequestKind::CancelRemainOnChannel => None,
        }
    }
}

/// Something the host does at a point of the run.
#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    /// Link the interface at this position of `Scenario::interfaces` to its channel.
    Link(usize),
    Unlink(usize),
    Request(RequestKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostRequest {
    /// Offset from the start of the run.
    pub at: Duration,
    pub action: HostAction,
}

impl Scenario {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Link, unlink and scenario requests in the order they are issued.
    pub fn timeline(&self) -> Vec<HostRequest> {
        let mut timeline = Vec::new();
        for (index, spec) in self.interfaces.iter().enumerate() {
            timeline.push(HostRequest {
                at: Duration::from_millis(spec.link_at_ms),
                action: HostAction::Link(index),
            });
            if let Some(unlink_at_ms) = spec.unlink_at_ms {
                timeline.push(HostRequest {
                    at: Duration::from_millis(unlink_at_ms),
                    action: HostAction::Unlink(index),
                });
            }
        }
        for request in &self.requests {
            timeline.push(HostRequest {
                at: Duration::from_millis(request.at_ms),
                action: HostAction::Request(request.request.clone()),
            });
        }
        // Stable: same-time actions keep declaration order.
        timeline.sort_by_key(|r| r.at);
        timeline
    }
}

/// Load and validate a scenario file.
pub fn load_scenario(path: &Path, config: &SchedulerConfig) -> anyhow::Result<Scenario> {
    let data = fs::read_to_string(path).with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&data).context("Invalid JSON format")?;
    validate_scenario(&scenario, config).map_err(|e| anyhow::anyhow!("Validation error: {}", e))?;
    Ok(scenario)
}

/// Validate a scenario against the scheduler it will run on.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scenario(scenario: &Scenario, config: &SchedulerConfig) -> Result<(), String> {
    const MAX_SPEED_PERCENT: u32 = 1000;

    if scenario.duration_ms == 0 {
        return Err("duration_ms must be positive".to_string());
    }
    if scenario.speed_percent == 0 || scenario.speed_percent > MAX_SPEED_PERCENT {
        return Err(format!("speed_percent {} outside 1-{}", scenario.speed_percent, MAX_SPEED_PERCENT));
    }
    if !scenario.beacon_jitter_us.is_finite() || scenario.beacon_jitter_us < 0.0 {
        return Err(format!("beacon_jitter_us {} must be a non-negative number", scenario.beacon_jitter_us));
    }
    if scenario.hardware.cca_busy_percent > 100 {
        return Err(format!("cca_busy_percent {} exceeds 100", scenario.hardware.cca_busy_percent));
    }
    if scenario.interfaces.is_empty() {
        return Err("Scenario must contain at least one interface".to_string());
    }
    if scenario.interfaces.len() > config.max_vifs as usize {
        return Err(format!(
            "Interface count {} exceeds max-vifs {}",
            scenario.interfaces.len(),
            config.max_vifs
        ));
    }

    let mut names = HashSet::new();
    for spec in &scenario.interfaces {
        if !names.insert(spec.name.as_str()) {
            return Err(format!("Duplicate interface name: {}", spec.name));
        }
        if spec.beacon_interval_us == 0 {
            return Err(format!("Interface {} has a zero beacon interval", spec.name));
        }
        if !(0.0..=1.0).contains(&spec.traffic_probability) {
            return Err(format!(
                "Interface {} traffic_probability {} outside 0-1",
                spec.name, spec.traffic_probability
            ));
        }
        if spec.channel.prim20_freq == 0 {
            return Err(format!("Interface {} has no channel frequency", spec.name));
        }
        if let Some(unlink_at_ms) = spec.unlink_at_ms {
            if unlink_at_ms <= spec.link_at_ms {
                return Err(format!(
                    "Interface {} is unlinked at {} ms, before its link at {} ms",
                    spec.name, unlink_at_ms, spec.link_at_ms
                ));
            }
        }
    }

    for request in &scenario.requests {
        if let Some(interface) = request.request.interface() {
            if !names.contains(interface) {
                return Err(format!("Request at {} ms refers to unknown interface {}", request.at_ms, interface));
            }
        }
        match &request.request {
            RequestKind::Scan { duration_ms: 0, .. } | RequestKind::RemainOnChannel { duration_ms: 0, .. } => {
                return Err(format!("Request at {} ms has a zero duration", request.at_ms));
            }
            _ => {}
        }
    }
    Ok(())
}
