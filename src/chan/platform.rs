//! Collaborator interfaces consumed by the scheduler.
//!
//! The scheduler never touches hardware or wall-clock time directly. Everything it needs
//! from the outside world goes through these traits, which the host (or a test double)
//! implements. Completion of asynchronous requests comes back as an [`Event`] passed to
//! [`Scheduler::handle`](super::Scheduler::handle).
//!
//! [`Event`]: super::Event

use embassy_time::{Duration, Instant};

use super::types::{ChannelParams, Indication, NoaCounter, TimerId, VifIdx};

pub trait Clock {
    fn now(&self) -> Instant;
}

/// Single-shot timers. Arming an already armed timer moves its deadline.
pub trait TimerService {
    fn arm(&mut self, timer: TimerId, at: Instant);
    fn disarm(&mut self, timer: TimerId);
}

pub trait RadioControl {
    /// Program the RF front end for `params`.
    fn tune(&mut self, params: &ChannelParams);
    fn set_tx_power(&mut self, dbm: i8);
    /// Ask the MAC to reach idle; completion is reported with `Event::IdleReached`.
    fn request_idle(&mut self);
    /// Flush the transmit and receive queues and keep the MAC idle.
    fn force_idle(&mut self);
    /// Leave idle and resume normal operation.
    fn set_active(&mut self);
    /// Hand the idle state back to the host once no channel is in use.
    fn back_to_host_idle(&mut self);
    /// Power-management bit advertised in transmitted frames.
    fn set_pwr_mgt(&mut self, on: bool);
    fn pwr_mgt(&self) -> bool;
    /// Process frames already received so they are reported with the right channel.
    fn flush_rx(&mut self);
    fn reset_cca_busy(&mut self);
    /// CCA busy time accumulated since the last reset.
    fn cca_busy_us(&self) -> u32;
    fn noise_dbm(&self) -> Option<i8>;
}

pub trait TrafficDetection {
    /// Whether traffic was seen on `vif` during the last detection interval.
    fn traffic_detected(&self, vif: VifIdx) -> bool;
    /// The radio has been present on the channel of `vif`.
    fn note_channel_presence(&mut self, vif: VifIdx);
}

pub trait FrameTx {
    /// Queue a null frame towards `peer`. When `awaiting_confirmation` is set the transmit
    /// confirmation must be reported with `Event::NullFrameConfirmed`.
    ///
    /// Returns `false` if the frame could not be queued.
    fn send_null_frame(&mut self, vif: VifIdx, peer: u8, awaiting_confirmation: bool) -> bool;
    /// Push frames held back while the radio was away.
    fn send_postponed_frames(&mut self, vif: VifIdx);
}

pub trait PowerSave {
    /// Stations are in power save and did not pause it, so peers already expect absence.
    fn ps_active(&self) -> bool;
    fn set_scan_ongoing(&mut self, ongoing: bool);
}

/// P2P group-owner notice-of-absence windows.
pub trait NoaService {
    /// Returns the NOA index, or `None` if no NOA slot is available.
    fn start_go_noa(&mut self, vif: VifIdx, counter: NoaCounter, interval: Duration, duration: Duration, start: Instant) -> Option<u8>;
    fn update_go_noa_duration(&mut self, vif: VifIdx, noa: u8, duration: Duration);
    fn stop_go_noa(&mut self, vif: VifIdx, noa: u8);
}

pub trait Indications {
    fn indicate(&mut self, indication: Indication);
}

/// Everything the scheduler needs from its host.
pub trait Platform: Clock + TimerService + RadioControl + TrafficDetection + FrameTx + PowerSave + NoaService + Indications {}

impl<T> Platform for T where T: Clock + TimerService + RadioControl + TrafficDetection + FrameTx + PowerSave + NoaService + Indications {}
