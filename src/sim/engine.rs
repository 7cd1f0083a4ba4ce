//! Discrete-event engine driving the scheduler through a scenario.
//!
//! The [`Engine`] owns the scheduler and its simulated radio. It knows every future
//! occurrence that can change the scheduler's state: armed timers, pending hardware
//! completions, beacon receptions and presence ends. `engine_task` sleeps until the
//! earliest of them on the scaled virtual clock, or until the feeder task hands over the
//! next host request, and runs it to completion.
//!
//! Beacons are modelled per interface: one beacon per interval at its TBTT plus a
//! non-negative Gaussian delay. A beacon is only heard when the radio serves the
//! interface at that moment.

use anyhow::Context;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant, Timer};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::mpsc;

use crate::chan::{ChannelParams, Event, RocOp, RocRequest, RocRequester, Scheduler, SchedulerConfig, SchedulerError, TimerId, VifConfig, VifIdx};
use crate::log_capture::{self, CapturedLogEntry};

use super::platform::{HwCompletion, SimPlatform};
use super::report::{BeaconReport, Report};
use super::scenario::{HostAction, HostRequest, RequestKind, Scenario};

pub const HOST_REQUEST_CHANNEL_SIZE: usize = 32;
pub type HostRequestChannel = embassy_sync::channel::Channel<CriticalSectionRawMutex, HostRequest, HOST_REQUEST_CHANNEL_SIZE>;
pub type HostRequestReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, HostRequest, HOST_REQUEST_CHANNEL_SIZE>;
pub type HostRequestSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, HostRequest, HOST_REQUEST_CHANNEL_SIZE>;

/// Items processed at the same instant before this many are considered a livelock.
const MAX_ITEMS_PER_INSTANT: u32 = 10_000;

/// Lag behind the virtual deadline that triggers a warning.
const LAG_WARNING_THRESHOLD: Duration = Duration::from_millis(50);

/// The next thing that happens in the simulated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Due {
    Completion(HwCompletion),
    Timer(TimerId),
    Beacon(usize),
    PresenceEnd(usize),
    End,
}

struct BeaconState {
    vif: VifIdx,
    interval: Duration,
    /// Nominal time of the next beacon.
    tbtt: Instant,
    /// When that beacon actually reaches the radio.
    rx_at: Instant,
    presence_end: Option<Instant>,
    linked: bool,
    received: u64,
    missed: u64,
}

pub struct Engine {
    sched: Scheduler<SimPlatform>,
    scenario: Scenario,
    start: Instant,
    end: Instant,
    vifs: Vec<VifIdx>,
    names: HashMap<String, VifIdx>,
    beacons: Vec<BeaconState>,
    rejected: Vec<String>,
    last_instant: Instant,
    items_at_instant: u32,
    finished: bool,
}

impl Engine {
    pub fn new(scenario: Scenario, config: SchedulerConfig, start: Instant) -> anyhow::Result<Self> {
        let platform = SimPlatform::new(start, scenario.hardware.clone(), scenario.seed, scenario.beacon_jitter_us);
        let mut sched = Scheduler::new(config, platform).context("Cannot start the channel scheduler")?;

        let mut vifs = Vec::new();
        let mut names = HashMap::new();
        let mut beacons = Vec::new();
        for spec in &scenario.interfaces {
            let interval = Duration::from_micros(spec.beacon_interval_us);
            let vif = sched
                .register_vif(VifConfig {
                    kind: spec.kind,
                    p2p: spec.p2p,
                    beacon_interval: interval,
                    peer_ap: spec.peer_ap,
                })
                .map_err(|e| anyhow::anyhow!("Cannot register interface {}: {}", spec.name, e))?;
            sched.set_vif_active(vif, spec.active)?;
            sched.set_vif_tx_power(vif, spec.tx_power)?;
            sched.set_vif_user_tx_power(vif, spec.user_tx_power)?;
            sched.platform_mut().set_traffic_probability(vif, spec.traffic_probability);

            let tbtt = start + Duration::from_micros(spec.first_tbtt_us);
            let rx_at = tbtt + sched.platform_mut().beacon_delay();
            beacons.push(BeaconState {
                vif,
                interval,
                tbtt,
                rx_at,
                presence_end: None,
                linked: false,
                received: 0,
                missed: 0,
            });
            vifs.push(vif);
            names.insert(spec.name.clone(), vif);
        }
        sched.platform_mut().sample_traffic();

        info!(
            "Scenario '{}': {} interfaces, {} ms at {}% speed",
            scenario.name,
            vifs.len(),
            scenario.duration_ms,
            scenario.speed_percent
        );
        Ok(Self {
            end: start + scenario.duration(),
            sched,
            scenario,
            start,
            vifs,
            names,
            beacons,
            rejected: Vec::new(),
            last_instant: start,
            items_at_instant: 0,
            finished: false,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn next_due(&self) -> (Instant, Due) {
        let platform = self.sched.platform();
        let mut next = (self.end, Due::End);
        let mut consider = |at: Instant, due: Due| {
            if (at, due) < next {
                next = (at, due);
            }
        };
        if let Some((at, completion)) = platform.next_completion() {
            consider(at, Due::Completion(completion));
        }
        if let Some((at, timer)) = platform.next_timer() {
            consider(at, Due::Timer(timer));
        }
        for (index, beacon) in self.beacons.iter().enumerate() {
            consider(beacon.rx_at, Due::Beacon(index));
            if let Some(at) = beacon.presence_end {
                consider(at, Due::PresenceEnd(index));
            }
        }
        next
    }

    /// Deadline of the next occurrence.
    pub fn next_deadline(&self) -> Instant {
        self.next_due().0
    }

    /// Process everything due at or before `limit`.
    pub fn run_until(&mut self, limit: Instant) {
        while !self.finished {
            let (at, due) = self.next_due();
            if at > limit {
                break;
            }
            self.fire(at, due);
        }
        if !self.finished {
            self.sched.platform_mut().advance_to(limit);
        }
    }

    fn fire(&mut self, at: Instant, due: Due) {
        if at == self.last_instant {
            self.items_at_instant += 1;
            if self.items_at_instant > MAX_ITEMS_PER_INSTANT {
                error!("Simulation stuck at {} us, stopping", (at - self.start).as_micros());
                self.finished = true;
                return;
            }
        } else {
            self.last_instant = at;
            self.items_at_instant = 0;
        }
        self.sched.platform_mut().advance_to(at);

        let result = match due {
            Due::Completion(completion) => {
                self.sched.platform_mut().take_completion((at, completion));
                match completion {
                    HwCompletion::IdleReached => self.sched.handle(Event::IdleReached),
                    HwCompletion::NullFrameConfirmed => self.sched.handle(Event::NullFrameConfirmed),
                }
            }
            Due::Timer(timer) => {
                self.sched.platform_mut().take_timer(timer);
                if timer == TimerId::Distribution {
                    self.sched.platform_mut().sample_traffic();
                }
                self.sched.handle(Event::TimerExpired(timer))
            }
            Due::Beacon(index) => self.beacon(index),
            Due::PresenceEnd(index) => {
                self.beacons[index].presence_end = None;
                let vif = self.beacons[index].vif;
                self.sched.handle(Event::BeaconPresenceEnded { vif })
            }
            Due::End => {
                self.finished = true;
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("Scheduler rejected {:?}: {}", due, e);
        }
    }

    fn beacon(&mut self, index: usize) -> Result<(), SchedulerError> {
        let beacon = &self.beacons[index];
        let (vif, at, next_tbtt) = (beacon.vif, beacon.rx_at, beacon.tbtt + beacon.interval);
        let heard = beacon.linked && self.sched.is_on_channel(vif);

        let delay = self.sched.platform_mut().beacon_delay();
        let duration = Duration::from_micros(self.scenario.hardware.beacon_duration_us);
        let beacon = &mut self.beacons[index];
        beacon.tbtt = next_tbtt;
        beacon.rx_at = next_tbtt + delay;
        if !beacon.linked {
            return Ok(());
        }
        if !heard {
            beacon.missed += 1;
            return Ok(());
        }
        beacon.received += 1;
        beacon.presence_end = Some(at + duration);
        if beacon.received == 1 {
            self.sched.set_beacon_received(vif)?;
        }
        self.sched.handle(Event::TbttUpdated { vif, tbtt: next_tbtt })
    }

    fn vif_by_name(&self, name: &str) -> Result<VifIdx, String> {
        self.names.get(name).copied().ok_or_else(|| format!("unknown interface {}", name))
    }

    /// Apply a host request at its point of the run.
    pub fn apply(&mut self, request: &HostRequest) {
        let at = self.start + request.at;
        self.run_until(at);
        if self.finished {
            return;
        }
        debug!("Host request at {} ms: {:?}", request.at.as_millis(), request.action);
        if let Err(e) = self.apply_action(&request.action) {
            warn!("Host request at {} ms rejected: {}", request.at.as_millis(), e);
            self.rejected.push(format!("{} ms {:?}: {}", request.at.as_millis(), request.action, e));
        }
    }

    fn apply_action(&mut self, action: &HostAction) -> Result<(), String> {
        match action {
            HostAction::Link(index) => {
                let vif = self.vifs[*index];
                let params = self.scenario.interfaces[*index].channel;
                let chan = self.sched.add_context(params).map_err(|e| e.to_string())?;
                self.sched.link(vif, chan).map_err(|e| e.to_string())?;
                self.beacons[*index].linked = true;
                Ok(())
            }
            HostAction::Unlink(index) => {
                let vif = self.vifs[*index];
                if !self.beacons[*index].linked {
                    return Err(format!("{} was never linked", vif));
                }
                self.beacons[*index].linked = false;
                self.beacons[*index].presence_end = None;
                self.sched.unlink(vif).map_err(|e| e.to_string())
            }
            HostAction::Request(request) => self.apply_request(request),
        }
    }

    fn apply_request(&mut self, request: &RequestKind) -> Result<(), String> {
        let result = match request {
            RequestKind::Scan {
                interface,
                band,
                freq,
                duration_ms,
                tx_power,
            } => {
                let vif = self.vif_by_name(interface)?;
                self.sched.scan_request(*band, *freq, *tx_power, Duration::from_millis(*duration_ms), vif)
            }
            RequestKind::RemainOnChannel {
                interface,
                channel,
                duration_ms,
            } => {
                let request = RocRequest {
                    params: *channel,
                    duration: Duration::from_millis(*duration_ms),
                    vif: self.vif_by_name(interface)?,
                };
                self.sched.remain_on_channel(RocOp::Start(request), RocRequester::Host)
            }
            RequestKind::CancelRemainOnChannel => self.sched.remain_on_channel(RocOp::Cancel, RocRequester::Host),
            RequestKind::BeaconDetection { interface } => {
                let vif = self.vif_by_name(interface)?;
                self.sched.start_beacon_detection(vif).map(|started| {
                    if !started {
                        debug!("Beacon detection for {} not started", vif);
                    }
                })
            }
            RequestKind::UpdateChannel { interface, channel } => {
                let vif = self.vif_by_name(interface)?;
                self.update_channel(vif, *channel)
            }
            RequestKind::GoPresence { interface, present } => {
                let vif = self.vif_by_name(interface)?;
                self.sched.handle(Event::P2pGoPresence { vif, present: *present })
            }
            RequestKind::SetActive { interface, active } => {
                let vif = self.vif_by_name(interface)?;
                self.sched.set_vif_active(vif, *active)
            }
        };
        result.map_err(|e| e.to_string())
    }

    fn update_channel(&mut self, vif: VifIdx, params: ChannelParams) -> Result<(), SchedulerError> {
        let chan = self.sched.vif(vif).and_then(|entry| entry.chan).ok_or(SchedulerError::NotLinked(vif))?;
        self.sched.update_context(chan, params)
    }

    /// Close the run and build its report.
    pub fn finish(mut self, log: Vec<CapturedLogEntry>) -> Report {
        let end = self.end;
        self.sched.platform_mut().advance_to(end);
        let channels = self.sched.platform_mut().airtime();
        let beacons = self
            .beacons
            .iter()
            .zip(&self.scenario.interfaces)
            .map(|(beacon, spec)| BeaconReport {
                interface: spec.name.clone(),
                vif: beacon.vif,
                received: beacon.received,
                missed: beacon.missed,
            })
            .collect();
        let platform = self.sched.platform();
        Report {
            generated_at: chrono::Local::now().to_rfc3339(),
            scenario: self.scenario.name.clone(),
            duration_ms: self.scenario.duration_ms,
            stats: self.sched.stats(),
            channels,
            beacons,
            indications: platform.timeline().to_vec(),
            noa: platform.noa_records().to_vec(),
            rejected: self.rejected,
            log,
        }
    }
}

/// Hand the scenario's host requests to the engine at their time.
#[embassy_executor::task]
pub async fn feeder_task(start: Instant, requests: Vec<HostRequest>, request_tx: HostRequestSender) {
    for request in requests {
        Timer::at(start + request.at).await;
        request_tx.send(request).await;
    }
}

/// Run the scenario on the virtual clock and report the outcome through `done`.
#[embassy_executor::task]
pub async fn engine_task(
    scenario: Scenario,
    config: SchedulerConfig,
    start: Instant,
    request_rx: HostRequestReceiver,
    done: mpsc::Sender<anyhow::Result<Report>>,
) {
    let mut engine = match Engine::new(scenario, config, start) {
        Ok(engine) => engine,
        Err(e) => {
            let _ = done.send(Err(e));
            return;
        }
    };

    let mut lag_warning_issued = false;
    while !engine.is_finished() {
        let deadline = engine.next_deadline();
        match select(request_rx.receive(), Timer::at(deadline)).await {
            Either::First(request) => engine.apply(&request),
            Either::Second(()) => {
                let lag = Instant::now().checked_duration_since(deadline).unwrap_or(Duration::from_ticks(0));
                if lag > LAG_WARNING_THRESHOLD && !lag_warning_issued {
                    warn!("Simulation is {} ms behind the virtual clock; consider a lower speed", lag.as_millis());
                    lag_warning_issued = true;
                }
                engine.run_until(deadline);
            }
        }
    }

    let report = engine.finish(log_capture::drain_captured_logs());
    let _ = done.send(Ok(report));
}
