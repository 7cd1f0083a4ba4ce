//! Type definitions for the channel scheduler.
//!
//! Contains the handles, channel parameters, status enums, events and
//! indications shared by every part of the scheduler:
//! - Index handles for channel contexts and virtual interfaces
//! - Radio channel parameters and their comparison rules
//! - Context / TBTT status machines
//! - Events fed into the scheduler and indications emitted by it
//! - The scheduler error type

use embassy_time::{Duration, Instant};
use serde::{Deserialize, Serialize};

/// Handle of a channel context inside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChanIdx(pub u8);

impl std::fmt::Display for ChanIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Handle of a virtual interface (one logical link sharing the radio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VifIdx(pub u8);

impl std::fmt::Display for VifIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "V{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Band {
    #[default]
    #[serde(rename = "2.4ghz")]
    Ghz2_4,
    #[serde(rename = "5ghz")]
    Ghz5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bandwidth {
    #[default]
    Mhz20,
    Mhz40,
    Mhz80,
    Mhz160,
    Mhz80p80,
}

/// Radio parameters describing one channel of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelParams {
    pub band: Band,
    pub bandwidth: Bandwidth,
    /// Primary 20 MHz channel frequency (MHz).
    pub prim20_freq: u16,
    /// Center frequency of the first segment (MHz).
    pub center1_freq: u16,
    /// Center frequency of the second segment (80+80 only, else 0).
    #[serde(default)]
    pub center2_freq: u16,
    /// Transmit power (dBm).
    pub tx_power: i8,
}

impl ChannelParams {
    /// Two parameter sets describe the same channel when everything but the
    /// transmit power matches.
    pub fn same_channel(&self, other: &ChannelParams) -> bool {
        self.band == other.band
            && self.bandwidth == other.bandwidth
            && self.prim20_freq == other.prim20_freq
            && self.center1_freq == other.center1_freq
            && self.center2_freq == other.center2_freq
    }

    /// 20 MHz parameters for a single frequency, as used by scan requests.
    pub fn single(band: Band, freq: u16, tx_power: i8) -> Self {
        Self {
            band,
            bandwidth: Bandwidth::Mhz20,
            prim20_freq: freq,
            center1_freq: freq,
            center2_freq: 0,
            tx_power,
        }
    }
}

/// What a pool slot is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Traffic,
    Scan,
    RemainOnChannel,
}

/// Scheduling status of a channel context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChanStatus {
    /// No interface linked, not part of the scheduled set.
    #[default]
    NotScheduled,
    /// Scheduled, radio not on it and no switch towards it.
    NotProgrammed,
    /// Target of a switch, waiting for the radio to reach idle.
    GoingIdle,
    /// Target of a switch, waiting for absence null frames to be confirmed.
    WaitingAbsenceConfirm,
    /// Radio on it, end-of-presence (or end-of-operation) timer running.
    WaitingEnd,
    /// Radio on it, no end timer.
    Present,
    /// Radio on it, transmitting absence notices before leaving.
    SendingAbsenceNotice,
}

/// Status of a TBTT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TbttStatus {
    #[default]
    Idle,
    TimerProgrammed,
    Presence,
}

/// One interface's next scheduled beacon-presence window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TbttEntry {
    /// Time at which the radio should start moving to the channel.
    pub time: Instant,
    pub status: TbttStatus,
    /// Raised each time the entry loses a collision.
    pub priority: u8,
}

impl Default for TbttEntry {
    fn default() -> Self {
        Self {
            time: Instant::from_ticks(0),
            status: TbttStatus::Idle,
            priority: 0,
        }
    }
}

/// The single-shot timers owned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TimerId {
    /// Start of the next beacon-presence window.
    TbttSwitch,
    /// End of the current Channel Distribution Event.
    Distribution,
    /// Switch timeout, end of presence or end of scan/RoC operation.
    ContextOperation,
    /// Scan / remain-on-channel arbitration delay.
    Arbitration,
}

/// Who asked for a remain-on-channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RocRequester {
    /// Upper layers; the operation is arbitrated and its expiry is reported.
    Host,
    /// The scheduler itself (beacon detection); started at once, never reported.
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RocRequest {
    pub params: ChannelParams,
    pub duration: Duration,
    pub vif: VifIdx,
}

/// Remain-on-channel operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RocOp {
    Start(RocRequest),
    Cancel,
}

/// Asynchronous inputs dispatched through [`super::Scheduler::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    TimerExpired(TimerId),
    /// The radio reached idle after a `request_idle`.
    IdleReached,
    /// One absence null frame has been confirmed.
    NullFrameConfirmed,
    /// A beacon was received; `tbtt` is the next expected beacon time.
    TbttUpdated { vif: VifIdx, tbtt: Instant },
    /// The beacon presence of the interface is over.
    BeaconPresenceEnded { vif: VifIdx },
    /// The GO of a P2P client interface became present or absent.
    P2pGoPresence { vif: VifIdx, present: bool },
}

/// Channel occupancy report sent when a scan channel is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelSurvey {
    pub freq: u16,
    pub chan_time_ms: u32,
    pub chan_time_busy_ms: u32,
    pub noise_dbm: Option<i8>,
}

/// Notifications delivered to upper layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Indication {
    /// Stop pushing frames, the radio is about to leave `chan`.
    PreSwitch { chan: ChanIdx },
    /// The radio is on `chan`; frames may be pushed again.
    SwitchComplete { chan: ChanIdx, roc: bool, vif: Option<VifIdx> },
    ScanChannelStart,
    ScanChannelEnd,
    RocExpired { chan: ChanIdx, vif: VifIdx },
    Survey(ChannelSurvey),
}

/// P2P NOA counter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoaCounter {
    Continuous,
    Count(u8),
}

/// Error type for scheduler requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// No free channel context left.
    PoolExhausted,
    /// No free slot in the interface table.
    VifTableFull,
    UnknownVif(VifIdx),
    UnknownContext(ChanIdx),
    /// A context cannot be released while interfaces are linked to it.
    ContextStillLinked(ChanIdx),
    AlreadyLinked(VifIdx),
    NotLinked(VifIdx),
    /// An interface cannot be removed while linked to a context.
    VifStillLinked(VifIdx),
    ScanBusy,
    RocBusy,
    RocNotActive,
    InvalidBeaconInterval,
    /// The configuration failed `SchedulerConfig::validate`.
    InvalidConfig,
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::PoolExhausted => write!(f, "channel context pool exhausted"),
            SchedulerError::VifTableFull => write!(f, "virtual interface table full"),
            SchedulerError::UnknownVif(vif) => write!(f, "unknown virtual interface {}", vif),
            SchedulerError::UnknownContext(chan) => write!(f, "channel context {} is not in use", chan),
            SchedulerError::ContextStillLinked(chan) => write!(f, "channel context {} still has linked interfaces", chan),
            SchedulerError::AlreadyLinked(vif) => write!(f, "interface {} is already linked to a channel context", vif),
            SchedulerError::NotLinked(vif) => write!(f, "interface {} has no channel context", vif),
            SchedulerError::VifStillLinked(vif) => write!(f, "interface {} is still linked to a channel context", vif),
            SchedulerError::ScanBusy => write!(f, "a scan channel is already pending"),
            SchedulerError::RocBusy => write!(f, "a remain-on-channel operation is already in progress"),
            SchedulerError::RocNotActive => write!(f, "no remain-on-channel operation to cancel"),
            SchedulerError::InvalidBeaconInterval => write!(f, "beacon interval must be non-zero"),
            SchedulerError::InvalidConfig => write!(f, "invalid scheduler configuration"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Scheduler environment status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvStatus(u8);

impl EnvStatus {
    /// Remain-on-channel in progress.
    pub const ROC: u8 = 1 << 0;
    /// Scan in progress.
    pub const SCAN: u8 = 1 << 1;
    /// Switch timeout detected, consumed by the next pre-switch.
    pub const TIMEOUT: u8 = 1 << 2;
    /// Internal beacon-detection RoC running.
    pub const BCN_DETECT: u8 = 1 << 3;
    /// Remain-on-channel waiting for the arbitration delay.
    pub const ROC_WAIT: u8 = 1 << 4;
    /// Scan waiting for the arbitration delay.
    pub const SCAN_WAIT: u8 = 1 << 5;
    /// Arbitration delay timer armed.
    pub const DELAY_PROG: u8 = 1 << 6;

    pub fn contains(&self, bits: u8) -> bool {
        self.0 & bits != 0
    }

    pub fn set(&mut self, bits: u8) {
        self.0 |= bits;
    }

    pub fn clear(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// Running counters exposed for diagnostics and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SchedulerStats {
    pub distribution_events: u64,
    pub switches_started: u64,
    pub switches_completed: u64,
    pub tbtt_deferrals: u64,
    pub switch_timeouts: u64,
    pub absence_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_channel_ignores_tx_power() {
        let a = ChannelParams::single(Band::Ghz2_4, 2412, 20);
        let mut b = a;
        b.tx_power = 10;
        assert!(a.same_channel(&b));
        b.center1_freq = 2422;
        assert!(!a.same_channel(&b));
    }

    #[test]
    fn env_status_bits() {
        let mut s = EnvStatus::default();
        s.set(EnvStatus::SCAN | EnvStatus::DELAY_PROG);
        assert!(s.contains(EnvStatus::SCAN));
        assert!(s.contains(EnvStatus::ROC | EnvStatus::SCAN));
        s.clear(EnvStatus::SCAN);
        assert!(!s.contains(EnvStatus::SCAN));
        assert_eq!(s.bits(), EnvStatus::DELAY_PROG);
    }
}
