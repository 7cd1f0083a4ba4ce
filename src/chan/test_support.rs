//! Recording platform double and a manual event loop for scheduler tests.

use embassy_time::{Duration, Instant};
use std::collections::{BTreeMap, BTreeSet};

use super::config::SchedulerConfig;
use super::platform::{Clock, FrameTx, Indications, NoaService, PowerSave, RadioControl, TimerService, TrafficDetection};
use super::scheduler::Scheduler;
use super::types::{Band, ChannelParams, Event, Indication, NoaCounter, TimerId, VifIdx};
use super::vif::{VifConfig, VifKind};

pub struct FakePlatform {
    pub now: Instant,
    pub timers: BTreeMap<TimerId, Instant>,
    /// Hardware completions (idle reached, null frame confirmations) are delivered by
    /// `settle` only while this is set.
    pub deliver_hw: bool,
    pub idle_pending: bool,
    pub pending_cfms: u32,
    pub null_frame_ok: bool,
    pub idle_requests: u32,
    pub force_idle_calls: u32,
    pub active_calls: u32,
    pub back_to_host_idle: u32,
    pub flush_rx_calls: u32,
    pub tuned: Vec<ChannelParams>,
    pub tx_power: Option<i8>,
    pub pwr_mgt: bool,
    pub pwr_mgt_history: Vec<bool>,
    pub cca_busy_us: u32,
    pub noise: Option<i8>,
    pub traffic: BTreeSet<VifIdx>,
    pub presence_notes: Vec<VifIdx>,
    pub null_frames: Vec<(VifIdx, u8, bool)>,
    pub postponed: Vec<VifIdx>,
    pub ps_on: bool,
    pub scan_ongoing: bool,
    pub indications: Vec<Indication>,
    pub noa_started: Vec<(VifIdx, NoaCounter, Duration, Duration, Instant)>,
    pub noa_updates: Vec<(VifIdx, u8, Duration)>,
    pub noa_stopped: Vec<(VifIdx, u8)>,
    next_noa: u8,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            now: Instant::from_ticks(0),
            timers: BTreeMap::new(),
            deliver_hw: true,
            idle_pending: false,
            pending_cfms: 0,
            null_frame_ok: true,
            idle_requests: 0,
            force_idle_calls: 0,
            active_calls: 0,
            back_to_host_idle: 0,
            flush_rx_calls: 0,
            tuned: Vec::new(),
            tx_power: None,
            pwr_mgt: false,
            pwr_mgt_history: Vec::new(),
            cca_busy_us: 0,
            noise: None,
            traffic: BTreeSet::new(),
            presence_notes: Vec::new(),
            null_frames: Vec::new(),
            postponed: Vec::new(),
            ps_on: false,
            scan_ongoing: false,
            indications: Vec::new(),
            noa_started: Vec::new(),
            noa_updates: Vec::new(),
            noa_stopped: Vec::new(),
            next_noa: 0,
        }
    }
}

impl Clock for FakePlatform {
    fn now(&self) -> Instant {
        self.now
    }
}

impl TimerService for FakePlatform {
    fn arm(&mut self, timer: TimerId, at: Instant) {
        self.timers.insert(timer, at);
    }

    fn disarm(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }
}

impl RadioControl for FakePlatform {
    fn tune(&mut self, params: &ChannelParams) {
        self.tuned.push(*params);
    }

    fn set_tx_power(&mut self, dbm: i8) {
        self.tx_power = Some(dbm);
    }

    fn request_idle(&mut self) {
        self.idle_requests += 1;
        self.idle_pending = true;
    }

    fn force_idle(&mut self) {
        self.force_idle_calls += 1;
    }

    fn set_active(&mut self) {
        self.active_calls += 1;
    }

    fn back_to_host_idle(&mut self) {
        self.back_to_host_idle += 1;
    }

    fn set_pwr_mgt(&mut self, on: bool) {
        self.pwr_mgt = on;
        self.pwr_mgt_history.push(on);
    }

    fn pwr_mgt(&self) -> bool {
        self.pwr_mgt
    }

    fn flush_rx(&mut self) {
        self.flush_rx_calls += 1;
    }

    fn reset_cca_busy(&mut self) {
        self.cca_busy_us = 0;
    }

    fn cca_busy_us(&self) -> u32 {
        self.cca_busy_us
    }

    fn noise_dbm(&self) -> Option<i8> {
        self.noise
    }
}

impl TrafficDetection for FakePlatform {
    fn traffic_detected(&self, vif: VifIdx) -> bool {
        self.traffic.contains(&vif)
    }

    fn note_channel_presence(&mut self, vif: VifIdx) {
        self.presence_notes.push(vif);
    }
}

impl FrameTx for FakePlatform {
    fn send_null_frame(&mut self, vif: VifIdx, peer: u8, awaiting_confirmation: bool) -> bool {
        self.null_frames.push((vif, peer, awaiting_confirmation));
        if !self.null_frame_ok {
            return false;
        }
        if awaiting_confirmation {
            self.pending_cfms += 1;
        }
        true
    }

    fn send_postponed_frames(&mut self, vif: VifIdx) {
        self.postponed.push(vif);
    }
}

impl PowerSave for FakePlatform {
    fn ps_active(&self) -> bool {
        self.ps_on
    }

    fn set_scan_ongoing(&mut self, ongoing: bool) {
        self.scan_ongoing = ongoing;
    }
}

impl NoaService for FakePlatform {
    fn start_go_noa(&mut self, vif: VifIdx, counter: NoaCounter, interval: Duration, duration: Duration, start: Instant) -> Option<u8> {
        self.noa_started.push((vif, counter, interval, duration, start));
        let index = self.next_noa;
        self.next_noa += 1;
        Some(index)
    }

    fn update_go_noa_duration(&mut self, vif: VifIdx, noa: u8, duration: Duration) {
        self.noa_updates.push((vif, noa, duration));
    }

    fn stop_go_noa(&mut self, vif: VifIdx, noa: u8) {
        self.noa_stopped.push((vif, noa));
    }
}

impl Indications for FakePlatform {
    fn indicate(&mut self, indication: Indication) {
        self.indications.push(indication);
    }
}

pub fn new_scheduler() -> Scheduler<FakePlatform> {
    Scheduler::new(SchedulerConfig::default(), FakePlatform::default()).unwrap()
}

/// Register an inactive station interface with a known AP.
pub fn add_station(sched: &mut Scheduler<FakePlatform>, beacon_interval_us: u64) -> VifIdx {
    sched
        .register_vif(VifConfig {
            kind: VifKind::Station,
            p2p: false,
            beacon_interval: Duration::from_micros(beacon_interval_us),
            peer_ap: Some(1),
        })
        .unwrap()
}

/// 20 MHz 5 GHz channel at 20 dBm.
pub fn channel(freq: u16) -> ChannelParams {
    ChannelParams::single(Band::Ghz5, freq, 20)
}

/// Deliver pending hardware completions without advancing time.
pub fn settle(sched: &mut Scheduler<FakePlatform>) {
    for _ in 0..1000 {
        let platform = sched.platform_mut();
        if !platform.deliver_hw {
            return;
        }
        if platform.idle_pending {
            platform.idle_pending = false;
            sched.handle(Event::IdleReached).unwrap();
        } else if platform.pending_cfms > 0 {
            platform.pending_cfms -= 1;
            sched.handle(Event::NullFrameConfirmed).unwrap();
        } else {
            return;
        }
    }
    panic!("hardware completions never settled");
}

fn fire_next(sched: &mut Scheduler<FakePlatform>, limit: Option<Instant>) -> Option<TimerId> {
    let (timer, at) = sched.platform().timers.iter().map(|(&timer, &at)| (timer, at)).min_by_key(|&(timer, at)| (at, timer))?;
    if limit.is_some_and(|limit| at > limit) {
        return None;
    }
    let platform = sched.platform_mut();
    platform.timers.remove(&timer);
    if at > platform.now {
        platform.now = at;
    }
    sched.handle(Event::TimerExpired(timer)).unwrap();
    Some(timer)
}

/// Run timers in deadline order up to `limit`, then move the clock to `limit`.
pub fn run_until(sched: &mut Scheduler<FakePlatform>, limit: Instant) {
    for _ in 0..100_000 {
        settle(sched);
        if fire_next(sched, Some(limit)).is_none() {
            settle(sched);
            if sched.platform().now < limit {
                sched.platform_mut().now = limit;
            }
            return;
        }
    }
    panic!("timers kept firing before {:?}", limit);
}

/// Run timers in deadline order until `timer` has fired.
pub fn run_until_timer(sched: &mut Scheduler<FakePlatform>, timer: TimerId) {
    for _ in 0..100_000 {
        settle(sched);
        match fire_next(sched, None) {
            Some(fired) if fired == timer => return,
            Some(_) => {}
            None => panic!("{:?} is not armed", timer),
        }
    }
    panic!("{:?} never fired", timer);
}
