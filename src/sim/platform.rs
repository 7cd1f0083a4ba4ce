//! Simulated radio behind the scheduler's collaborator traits.
//!
//! Requests that complete asynchronously on real hardware (go-idle, null-frame
//! confirmation) are queued with the configured latency and handed back to the engine,
//! which feeds them to the scheduler as events when they fall due.

use embassy_time::{Duration, Instant};
use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::{BTreeMap, BTreeSet};

use crate::chan::platform::{Clock, FrameTx, Indications, NoaService, PowerSave, RadioControl, TimerService, TrafficDetection};
use crate::chan::{ChannelParams, Indication, NoaCounter, TimerId, VifIdx};

use super::report::{ChannelAirtime, NoaRecord, TimelineEntry};
use super::scenario::HardwareModel;

/// NOA schedules a GO can run at once.
const NOA_PER_VIF: u8 = 2;

/// Completions the radio reports some time after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HwCompletion {
    IdleReached,
    NullFrameConfirmed,
}

pub struct SimPlatform {
    start: Instant,
    now: Instant,
    hardware: HardwareModel,
    rng: StdRng,
    jitter: Option<Normal<f64>>,
    timers: BTreeMap<TimerId, Instant>,
    completions: Vec<(Instant, HwCompletion)>,
    idle_pending: bool,
    /// Frequency the radio is tuned to and since when, while a channel is in use.
    tuned: Option<(u16, Instant)>,
    airtime: BTreeMap<u16, Duration>,
    pwr_mgt: bool,
    cca_reset_at: Instant,
    traffic_probability: Vec<f64>,
    traffic: Vec<bool>,
    timeline: Vec<TimelineEntry>,
    noa: Vec<NoaRecord>,
    noa_in_use: BTreeSet<(VifIdx, u8)>,
}

impl SimPlatform {
    pub fn new(start: Instant, hardware: HardwareModel, seed: u64, beacon_jitter_us: f64) -> Self {
        let jitter = if beacon_jitter_us > 0.0 { Normal::new(0.0, beacon_jitter_us).ok() } else { None };
        Self {
            start,
            now: start,
            hardware,
            rng: StdRng::seed_from_u64(seed),
            jitter,
            timers: BTreeMap::new(),
            completions: Vec::new(),
            idle_pending: false,
            tuned: None,
            airtime: BTreeMap::new(),
            pwr_mgt: false,
            cca_reset_at: start,
            traffic_probability: Vec::new(),
            traffic: Vec::new(),
            timeline: Vec::new(),
            noa: Vec::new(),
            noa_in_use: BTreeSet::new(),
        }
    }

    /// Move the virtual clock forward. Earlier instants are ignored.
    pub fn advance_to(&mut self, at: Instant) {
        if at > self.now {
            self.now = at;
        }
    }

    fn offset_us(&self, at: Instant) -> u64 {
        at.as_micros().saturating_sub(self.start.as_micros())
    }

    pub fn set_traffic_probability(&mut self, vif: VifIdx, probability: f64) {
        let index = vif.0 as usize;
        if self.traffic_probability.len() <= index {
            self.traffic_probability.resize(index + 1, 0.0);
            self.traffic.resize(index + 1, false);
        }
        self.traffic_probability[index] = probability;
    }

    /// Draw the traffic-detection status of every interface for the next interval.
    pub fn sample_traffic(&mut self) {
        for (detected, &probability) in self.traffic.iter_mut().zip(&self.traffic_probability) {
            *detected = self.rng.gen_bool(probability);
        }
    }

    /// Reception delay of a beacon after its TBTT.
    pub fn beacon_delay(&mut self) -> Duration {
        match &self.jitter {
            Some(normal) => Duration::from_micros(normal.sample(&mut self.rng).abs() as u64),
            None => Duration::from_ticks(0),
        }
    }

    /// Earliest armed timer.
    pub fn next_timer(&self) -> Option<(Instant, TimerId)> {
        self.timers.iter().map(|(&timer, &at)| (at, timer)).min()
    }

    pub fn take_timer(&mut self, timer: TimerId) -> Option<Instant> {
        self.timers.remove(&timer)
    }

    /// Earliest pending hardware completion.
    pub fn next_completion(&self) -> Option<(Instant, HwCompletion)> {
        self.completions.iter().copied().min()
    }

    pub fn take_completion(&mut self, completion: (Instant, HwCompletion)) {
        if let Some(pos) = self.completions.iter().position(|&c| c == completion) {
            self.completions.remove(pos);
        }
        if completion.1 == HwCompletion::IdleReached {
            self.idle_pending = false;
        }
    }

    fn close_airtime(&mut self) {
        if let Some((freq, since)) = self.tuned.take() {
            *self.airtime.entry(freq).or_insert(Duration::from_ticks(0)) += self.now - since;
        }
    }

    /// Per-frequency airtime up to now.
    pub fn airtime(&mut self) -> Vec<ChannelAirtime> {
        let tuned = self.tuned;
        self.close_airtime();
        if let Some((freq, _)) = tuned {
            self.tuned = Some((freq, self.now));
        }
        let total = self.offset_us(self.now).max(1) as f64;
        self.airtime
            .iter()
            .map(|(&freq, on_air)| ChannelAirtime {
                freq,
                on_air_us: on_air.as_micros(),
                share_percent: on_air.as_micros() as f64 * 100.0 / total,
            })
            .collect()
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn noa_records(&self) -> &[NoaRecord] {
        &self.noa
    }
}

impl Clock for SimPlatform {
    fn now(&self) -> Instant {
        self.now
    }
}

impl TimerService for SimPlatform {
    fn arm(&mut self, timer: TimerId, at: Instant) {
        trace!("Timer {:?} armed for {} us", timer, self.offset_us(at));
        self.timers.insert(timer, at);
    }

    fn disarm(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }
}

impl RadioControl for SimPlatform {
    fn tune(&mut self, params: &ChannelParams) {
        self.close_airtime();
        self.tuned = Some((params.prim20_freq, self.now));
        debug!("Radio tuned to {} MHz ({:?})", params.prim20_freq, params.bandwidth);
    }

    fn set_tx_power(&mut self, dbm: i8) {
        trace!("Transmit power {} dBm", dbm);
    }

    fn request_idle(&mut self) {
        // Requests made while one is pending complete together.
        if self.idle_pending {
            return;
        }
        self.idle_pending = true;
        let at = self.now + Duration::from_micros(self.hardware.go_idle_us);
        self.completions.push((at, HwCompletion::IdleReached));
    }

    fn force_idle(&mut self) {}

    fn set_active(&mut self) {}

    fn back_to_host_idle(&mut self) {
        self.close_airtime();
    }

    fn set_pwr_mgt(&mut self, on: bool) {
        self.pwr_mgt = on;
    }

    fn pwr_mgt(&self) -> bool {
        self.pwr_mgt
    }

    fn flush_rx(&mut self) {}

    fn reset_cca_busy(&mut self) {
        self.cca_reset_at = self.now;
    }

    fn cca_busy_us(&self) -> u32 {
        let elapsed = self.now.as_micros().saturating_sub(self.cca_reset_at.as_micros());
        (elapsed * self.hardware.cca_busy_percent as u64 / 100).min(u32::MAX as u64) as u32
    }

    fn noise_dbm(&self) -> Option<i8> {
        self.hardware.noise_floor_dbm
    }
}

impl TrafficDetection for SimPlatform {
    fn traffic_detected(&self, vif: VifIdx) -> bool {
        self.traffic.get(vif.0 as usize).copied().unwrap_or(false)
    }

    fn note_channel_presence(&mut self, _vif: VifIdx) {}
}

impl FrameTx for SimPlatform {
    fn send_null_frame(&mut self, vif: VifIdx, peer: u8, awaiting_confirmation: bool) -> bool {
        trace!("Null frame from {} to station {} (pm: {})", vif, peer, self.pwr_mgt);
        if awaiting_confirmation {
            let at = self.now + Duration::from_micros(self.hardware.null_frame_cfm_us);
            self.completions.push((at, HwCompletion::NullFrameConfirmed));
        }
        true
    }

    fn send_postponed_frames(&mut self, _vif: VifIdx) {}
}

impl PowerSave for SimPlatform {
    fn ps_active(&self) -> bool {
        self.hardware.stations_in_power_save
    }

    fn set_scan_ongoing(&mut self, ongoing: bool) {
        trace!("Sleep {} while scanning", if ongoing { "prevented" } else { "allowed" });
    }
}

impl NoaService for SimPlatform {
    fn start_go_noa(&mut self, vif: VifIdx, counter: NoaCounter, interval: Duration, duration: Duration, start: Instant) -> Option<u8> {
        let Some(index) = (0..NOA_PER_VIF).find(|&i| !self.noa_in_use.contains(&(vif, i))) else {
            warn!("No NOA slot left on {}", vif);
            return None;
        };
        self.noa_in_use.insert((vif, index));
        self.noa.push(NoaRecord {
            at_us: self.offset_us(self.now),
            vif,
            index,
            counter,
            interval_us: interval.as_micros(),
            duration_us: duration.as_micros(),
            start_us: self.offset_us(start),
            updates_us: Vec::new(),
            stopped_at_us: None,
        });
        Some(index)
    }

    fn update_go_noa_duration(&mut self, vif: VifIdx, noa: u8, duration: Duration) {
        if let Some(record) = self.noa.iter_mut().rev().find(|r| r.vif == vif && r.index == noa) {
            record.updates_us.push(duration.as_micros());
        }
    }

    fn stop_go_noa(&mut self, vif: VifIdx, noa: u8) {
        self.noa_in_use.remove(&(vif, noa));
        let at_us = self.offset_us(self.now);
        if let Some(record) = self.noa.iter_mut().rev().find(|r| r.vif == vif && r.index == noa && r.stopped_at_us.is_none()) {
            record.stopped_at_us = Some(at_us);
        }
    }
}

impl Indications for SimPlatform {
    fn indicate(&mut self, indication: Indication) {
        let at_us = self.offset_us(self.now);
        debug!("Indication at {} us: {:?}", at_us, indication);
        self.timeline.push(TimelineEntry { at_us, indication });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chan::Band;

    fn platform() -> SimPlatform {
        SimPlatform::new(Instant::from_ticks(0), HardwareModel::default(), 7, 0.0)
    }

    #[test]
    fn idle_requests_complete_once_after_latency() {
        let mut platform = platform();
        platform.advance_to(Instant::from_micros(1_000));
        platform.request_idle();
        platform.request_idle();
        let completion = platform.next_completion().unwrap();
        assert_eq!(completion, (Instant::from_micros(1_200), HwCompletion::IdleReached));
        platform.take_completion(completion);
        assert_eq!(platform.next_completion(), None);
        platform.request_idle();
        assert!(platform.next_completion().is_some());
    }

    #[test]
    fn airtime_follows_tuning() {
        let mut platform = platform();
        platform.tune(&ChannelParams::single(Band::Ghz5, 5180, 20));
        platform.advance_to(Instant::from_micros(30_000));
        platform.tune(&ChannelParams::single(Band::Ghz5, 5200, 20));
        platform.advance_to(Instant::from_micros(40_000));
        platform.back_to_host_idle();
        platform.advance_to(Instant::from_micros(100_000));

        let airtime = platform.airtime();
        assert_eq!(airtime.len(), 2);
        assert_eq!((airtime[0].freq, airtime[0].on_air_us), (5180, 30_000));
        assert_eq!((airtime[1].freq, airtime[1].on_air_us), (5200, 10_000));
        assert!((airtime[0].share_percent - 30.0).abs() < 1e-9);
        assert!(platform.tuned.is_none());
    }

    #[test]
    fn traffic_follows_probability_extremes() {
        let mut platform = platform();
        platform.set_traffic_probability(VifIdx(0), 1.0);
        platform.set_traffic_probability(VifIdx(2), 0.0);
        for _ in 0..20 {
            platform.sample_traffic();
            assert!(platform.traffic_detected(VifIdx(0)));
            assert!(!platform.traffic_detected(VifIdx(1)));
            assert!(!platform.traffic_detected(VifIdx(2)));
        }
        assert!(!platform.traffic_detected(VifIdx(3)));
    }

    #[test]
    fn beacon_delay_is_never_negative() {
        let mut platform = SimPlatform::new(Instant::from_ticks(0), HardwareModel::default(), 3, 500.0);
        let delays: Vec<u64> = (0..200).map(|_| platform.beacon_delay().as_micros()).collect();
        assert!(delays.iter().any(|&d| d > 0));
        assert_eq!(self::platform().beacon_delay(), Duration::from_ticks(0));
    }

    #[test]
    fn noa_slots_are_limited_per_interface() {
        let mut platform = platform();
        let vif = VifIdx(1);
        let interval = Duration::from_micros(102_400);
        let window = Duration::from_micros(46_080);
        let start = Instant::from_micros(50_000);
        assert_eq!(platform.start_go_noa(vif, NoaCounter::Continuous, interval, window, start), Some(0));
        assert_eq!(platform.start_go_noa(vif, NoaCounter::Continuous, interval, window, start), Some(1));
        assert_eq!(platform.start_go_noa(vif, NoaCounter::Continuous, interval, window, start), None);
        platform.update_go_noa_duration(vif, 0, Duration::from_micros(40_000));
        platform.stop_go_noa(vif, 0);
        assert_eq!(platform.start_go_noa(vif, NoaCounter::Count(3), interval, window, start), Some(0));

        let records = platform.noa_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].updates_us, vec![40_000]);
        assert_eq!(records[0].stopped_at_us, Some(0));
        assert_eq!(records[2].stopped_at_us, None);
    }

    #[test]
    fn cca_busy_scales_with_elapsed_time() {
        let hardware = HardwareModel {
            cca_busy_percent: 25,
            ..HardwareModel::default()
        };
        let mut platform = SimPlatform::new(Instant::from_ticks(0), hardware, 0, 0.0);
        platform.advance_to(Instant::from_micros(10_000));
        platform.reset_cca_busy();
        platform.advance_to(Instant::from_micros(50_000));
        assert_eq!(platform.cca_busy_us(), 10_000);
    }
}
