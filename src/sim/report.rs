//! Run report written at the end of a simulation.

use anyhow::Context;
use log::info;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::chan::{Indication, NoaCounter, SchedulerStats, VifIdx};
use crate::log_capture::CapturedLogEntry;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Wall-clock time the report was generated (RFC 3339).
    pub generated_at: String,
    pub scenario: String,
    pub duration_ms: u64,
    pub stats: SchedulerStats,
    pub channels: Vec<ChannelAirtime>,
    pub beacons: Vec<BeaconReport>,
    pub indications: Vec<TimelineEntry>,
    pub noa: Vec<NoaRecord>,
    /// Host requests the scheduler refused.
    pub rejected: Vec<String>,
    pub log: Vec<CapturedLogEntry>,
}

/// Time the radio spent tuned to one frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAirtime {
    pub freq: u16,
    pub on_air_us: u64,
    pub share_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconReport {
    pub interface: String,
    pub vif: VifIdx,
    pub received: u64,
    pub missed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    /// Offset from the start of the run.
    pub at_us: u64,
    pub indication: Indication,
}

/// A notice-of-absence schedule started for a P2P GO.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoaRecord {
    pub at_us: u64,
    pub vif: VifIdx,
    pub index: u8,
    pub counter: NoaCounter,
    pub interval_us: u64,
    pub duration_us: u64,
    pub start_us: u64,
    /// Duration updates applied later, in order.
    pub updates_us: Vec<u64>,
    pub stopped_at_us: Option<u64>,
}

impl Report {
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report file: {}", path.display()))?;
        info!("Report written to {}", path.display());
        Ok(())
    }

    pub fn log_summary(&self) {
        info!(
            "Run '{}' finished after {} ms: {} distribution events, {} switches ({} timed out), {} TBTT deferrals, {} absence frames",
            self.scenario,
            self.duration_ms,
            self.stats.distribution_events,
            self.stats.switches_completed,
            self.stats.switch_timeouts,
            self.stats.tbtt_deferrals,
            self.stats.absence_frames
        );
        for channel in &self.channels {
            info!("  {} MHz: {:.1}% of the run ({} us)", channel.freq, channel.share_percent, channel.on_air_us);
        }
        for beacon in &self.beacons {
            info!("  {} ({}): {} beacons received, {} missed", beacon.interface, beacon.vif, beacon.received, beacon.missed);
        }
        if !self.rejected.is_empty() {
            info!("  {} host requests rejected", self.rejected.len());
        }
    }
}
