//! TBTT scheduling.
//!
//! Every linked interface owns one [`TbttEntry`](super::types::TbttEntry) describing when
//! the radio has to start moving to its channel for the next beacon. Entries are kept in
//! chronological order. Two presence windows that overlap (or start at the same instant)
//! collide: the lower-priority entry is pushed back by one beacon interval and its priority
//! raised, so a repeatedly deferred entry eventually wins.

use embassy_time::Instant;
use log::{debug, warn};

use super::platform::Platform;
use super::scheduler::Scheduler;
use super::types::{ChanStatus, EnvStatus, NoaCounter, SchedulerError, TbttStatus, TimerId, VifIdx};
use super::vif::NoaWindow;

impl<P: Platform> Scheduler<P> {
    /// Whether two presence windows starting at `start1` and `start2` overlap.
    pub(super) fn tbtt_conflict(&self, start1: Instant, start2: Instant) -> bool {
        let window = self.config.presence_window();
        (start1 >= start2 && start1 <= start2 + window) || (start2 >= start1 && start2 <= start1 + window)
    }

    fn tbtt_time(&self, vif: VifIdx) -> Instant {
        self.vifs.get(vif).map(|v| v.tbtt.time).unwrap_or(Instant::from_ticks(0))
    }

    /// Try to place `vif` in the TBTT list. Colliding entries with a lower priority are
    /// moved to the delayed queue; if the candidate loses a collision it is delayed instead.
    fn tbtt_insert(&mut self, vif: VifIdx) {
        let Some(candidate) = self.vifs.get(vif).map(|v| v.tbtt) else {
            return;
        };
        debug_assert!(!self.tbtt_list.contains(&vif), "TBTT entry inserted twice");

        let mut losers = Vec::new();
        let mut insert = true;
        for &other in &self.tbtt_list {
            let Some(entry) = self.vifs.get(other).map(|v| v.tbtt) else {
                continue;
            };
            let conflict = self.tbtt_conflict(candidate.time, entry.time);
            if entry.status == TbttStatus::Presence {
                if candidate.time < entry.time || conflict {
                    insert = false;
                    break;
                }
            } else if conflict {
                if candidate.priority > entry.priority {
                    losers.push(other);
                } else {
                    insert = false;
                    break;
                }
            } else if candidate.time < entry.time {
                break;
            }
        }

        if !insert {
            debug!("TBTT of {} at {} us deferred", vif, candidate.time.as_micros());
            self.stats.tbtt_deferrals += 1;
            self.tbtt_delayed.push_back(vif);
            return;
        }

        for loser in losers {
            debug!("TBTT of {} deferred by {}", loser, vif);
            self.stats.tbtt_deferrals += 1;
            if self.tbtt_timer_target == Some(loser) {
                self.platform.disarm(TimerId::TbttSwitch);
                self.tbtt_timer_target = None;
            }
            if let Some(entry) = self.vifs.get_mut(loser) {
                entry.tbtt.status = TbttStatus::Idle;
            }
            self.tbtt_list.retain(|&v| v != loser);
            self.tbtt_delayed.push_back(loser);
        }

        let position = self.tbtt_list.partition_point(|&other| self.tbtt_time(other) <= candidate.time);
        self.tbtt_list.insert(position, vif);
    }

    /// Push an entry back by one beacon interval and raise its priority.
    fn tbtt_delay(&mut self, vif: VifIdx) {
        let max = self.config.tbtt_priority_max;
        if let Some(entry) = self.vifs.get_mut(vif) {
            entry.tbtt.time += entry.beacon_interval;
            if entry.tbtt.priority < max {
                entry.tbtt.priority += 1;
            }
        }
    }

    /// Insert `vif` (if any) and the entries it displaced, then make sure the first entry
    /// of the list is either being served or has its timer armed.
    pub(super) fn tbtt_schedule(&mut self, vif: Option<VifIdx>) {
        if let Some(vif) = vif {
            self.tbtt_insert(vif);
            while let Some(delayed) = self.tbtt_delayed.pop_front() {
                self.tbtt_delay(delayed);
                self.tbtt_insert(delayed);
            }
        }

        let Some(&first) = self.tbtt_list.first() else {
            return;
        };
        let Some(entry) = self.vifs.get(first).map(|v| v.tbtt) else {
            return;
        };
        if entry.status != TbttStatus::Idle {
            return;
        }

        let now = self.platform.now();
        if entry.time < now + self.config.min_timer() {
            self.tbtt_switch_evt(first);
        } else {
            // One timer serves the whole list: a previously armed entry falls back to idle.
            for &other in &self.tbtt_list[1..] {
                if let Some(v) = self.vifs.get_mut(other) {
                    if v.tbtt.status == TbttStatus::TimerProgrammed {
                        v.tbtt.status = TbttStatus::Idle;
                    }
                }
            }
            if let Some(v) = self.vifs.get_mut(first) {
                v.tbtt.status = TbttStatus::TimerProgrammed;
            }
            self.tbtt_timer_target = Some(first);
            self.platform.arm(TimerId::TbttSwitch, entry.time);
        }
    }

    /// Start of a beacon-presence window for `vif`.
    pub(super) fn tbtt_switch_evt(&mut self, vif: VifIdx) {
        let Some(entry) = self.vifs.get(vif) else {
            return;
        };
        let Some(chan) = entry.chan else {
            return;
        };
        let is_go = entry.is_p2p_go();

        if self.scheduled.len() < 2 || self.status.contains(EnvStatus::ROC | EnvStatus::SCAN) {
            return;
        }
        if self.switch_in_flight && self.switching != Some(chan) {
            return;
        }

        if is_go && self.config.capabilities.p2p_go {
            self.p2p_noa_manage(vif);
        }

        let now = self.platform.now();
        if let Some(current) = self.current {
            self.charge_elapsed(current, now);
        }
        let presence = self.config.tbtt_presence_slots;
        let ctx = &mut self.pool[chan];
        ctx.slots_reserved -= presence.min(ctx.slots_reserved);
        self.cde_time = now;

        if let Some(entry) = self.vifs.get_mut(vif) {
            entry.tbtt.priority = 0;
            entry.tbtt.status = TbttStatus::Presence;
        }
        debug!("Beacon presence of {} on {} starts", vif, chan);

        self.switch_start(chan);
    }

    /// A GO sharing the radio with a station link announces absence for the time the radio
    /// spends on the station channel.
    fn p2p_noa_manage(&mut self, go: VifIdx) {
        let Some(position) = self.tbtt_list.iter().position(|&v| v == go) else {
            return;
        };
        let Some(&sta) = self.tbtt_list.get(position + 1) else {
            return;
        };
        let (Some(go_entry), Some(sta_entry)) = (self.vifs.get(go), self.vifs.get(sta)) else {
            return;
        };
        if !sta_entry.beacon_received {
            return;
        }
        let Some(sta_chan) = sta_entry.chan else {
            return;
        };

        let sta_slots = self.pool[sta_chan].slots_total;
        let mut duration = self.config.slots(sta_slots);
        let next_go_tbtt = go_entry.tbtt.time + go_entry.beacon_interval;
        if self.slots_between(next_go_tbtt, sta_entry.tbtt.time) < sta_slots as i64 {
            // The GO beacon falls inside the absence and must be served: stay away longer.
            duration += self.config.presence_window();
        }

        let sta_interval = sta_entry.beacon_interval;
        let sta_tbtt = sta_entry.tbtt.time;
        let running = go_entry.noa;
        match running {
            None => match self.platform.start_go_noa(go, NoaCounter::Continuous, sta_interval, duration, sta_tbtt) {
                Some(index) => {
                    debug!("NOA {} started for {}: {} us every {} us", index, go, duration.as_micros(), sta_interval.as_micros());
                    if let Some(entry) = self.vifs.get_mut(go) {
                        entry.noa = Some(NoaWindow { index, duration });
                    }
                }
                None => warn!("No NOA slot available for {}", go),
            },
            Some(noa) if noa.duration != duration => {
                self.platform.update_go_noa_duration(go, noa.index, duration);
                if let Some(entry) = self.vifs.get_mut(go) {
                    entry.noa = Some(NoaWindow { duration, ..noa });
                }
            }
            Some(_) => {}
        }
    }

    pub(super) fn stop_all_noa(&mut self) {
        let running: Vec<(VifIdx, u8)> = self
            .vifs
            .iter()
            .filter(|v| v.is_p2p_go())
            .filter_map(|v| v.noa.map(|noa| (v.index, noa.index)))
            .collect();
        for (vif, noa) in running {
            debug!("Stopping NOA {} of {}", noa, vif);
            self.platform.stop_go_noa(vif, noa);
            if let Some(entry) = self.vifs.get_mut(vif) {
                entry.noa = None;
            }
        }
    }

    /// A beacon revealed the next TBTT of `vif`.
    pub(super) fn tbtt_updated(&mut self, vif: VifIdx, tbtt: Instant) -> Result<(), SchedulerError> {
        let entry = self.vifs.get(vif).ok_or(SchedulerError::UnknownVif(vif))?;
        let Some(chan) = entry.chan else {
            return Ok(());
        };
        if !self.pool[chan].in_use || self.pool[chan].status == ChanStatus::NotScheduled {
            return Ok(());
        }
        let switch_time = Instant::from_micros(tbtt.as_micros().saturating_sub(self.config.tbtt_switch_advance_us as u64));
        if entry.tbtt.time == switch_time {
            return Ok(());
        }
        let status = entry.tbtt.status;
        if let Some(entry) = self.vifs.get_mut(vif) {
            entry.tbtt.time = switch_time;
        }
        if self.scheduled.len() < 2 {
            return Ok(());
        }

        // An entry in presence is rescheduled when its presence ends.
        if status != TbttStatus::Presence {
            if let Some(entry) = self.vifs.get_mut(vif) {
                entry.tbtt.status = TbttStatus::Idle;
            }
            if self.tbtt_timer_target == Some(vif) {
                self.tbtt_timer_target = None;
                self.platform.disarm(TimerId::TbttSwitch);
            }
            self.tbtt_list.retain(|&v| v != vif);
            self.tbtt_schedule(Some(vif));
        }
        Ok(())
    }

    /// The beacon of `vif` has been handled; leave its channel if something else is due.
    pub(super) fn beacon_presence_ended(&mut self, vif: VifIdx) -> Result<(), SchedulerError> {
        let entry = self.vifs.get(vif).ok_or(SchedulerError::UnknownVif(vif))?;
        if entry.tbtt.status != TbttStatus::Presence {
            return Ok(());
        }
        let now = self.platform.now();
        let interval = entry.beacon_interval;
        if let Some(entry) = self.vifs.get_mut(vif) {
            entry.tbtt.status = TbttStatus::Idle;
            // No beacon update arrived: derive the next window from the interval.
            while entry.tbtt.time <= now {
                entry.tbtt.time += interval;
            }
        }
        self.tbtt_list.retain(|&v| v != vif);

        if self.scheduled.len() < 2 {
            return Ok(());
        }
        self.tbtt_schedule(Some(vif));

        if self.status.contains(EnvStatus::ROC | EnvStatus::SCAN) || self.switch_in_flight {
            return Ok(());
        }
        let Some(current) = self.current else {
            return Ok(());
        };

        let elapsed = self.elapsed_slots(now);
        self.charge_elapsed(current, now);
        let ctx = &mut self.pool[current];
        if ctx.slots_reserved > 0 {
            // Presence started in an earlier absence: it consumed reserved slots.
            ctx.slots_reserved -= elapsed.min(ctx.slots_reserved);
        }
        self.cde_time = now;

        if let Some(next) = self.next_channel() {
            if Some(next) != self.current {
                self.switch_start(next);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chan::test_support::*;
    use crate::chan::types::{ChanIdx, Event, Indication};
    use crate::chan::vif::VifKind;
    use embassy_time::Duration;

    fn two_channel_setup(interval0: u64, interval1: u64) -> (crate::chan::Scheduler<FakePlatform>, VifIdx, VifIdx, ChanIdx, ChanIdx) {
        let mut sched = new_scheduler();
        let v0 = add_station(&mut sched, interval0);
        let v1 = add_station(&mut sched, interval1);
        let a = sched.add_context(channel(5180)).unwrap();
        let b = sched.add_context(channel(5200)).unwrap();
        sched.link(v0, a).unwrap();
        sched.link(v1, b).unwrap();
        settle(&mut sched);
        (sched, v0, v1, a, b)
    }

    #[test]
    fn conflict_window_boundaries() {
        let sched = new_scheduler();
        let t = Instant::from_micros(100_000);
        let window = sched.config.presence_window();
        assert!(sched.tbtt_conflict(t, t));
        assert!(sched.tbtt_conflict(t, t + window));
        assert!(sched.tbtt_conflict(t + window, t));
        assert!(!sched.tbtt_conflict(t, t + window + Duration::from_micros(1)));
        assert!(!sched.tbtt_conflict(t + window + Duration::from_micros(1), t));
    }

    #[test]
    fn identical_interval_collision_defers_one_entry() {
        let (mut sched, v0, v1, _, _) = two_channel_setup(100_000, 100_000);
        let tbtt = Instant::from_micros(200_000);
        sched.handle(Event::TbttUpdated { vif: v0, tbtt }).unwrap();
        sched.handle(Event::TbttUpdated { vif: v1, tbtt }).unwrap();

        let e0 = sched.vif(v0).unwrap().tbtt;
        let e1 = sched.vif(v1).unwrap().tbtt;
        assert_eq!(e0.time, Instant::from_micros(198_000));
        assert_eq!(e0.priority, 0);
        assert_eq!(e1.time, e0.time + Duration::from_micros(100_000));
        assert_eq!(e1.priority, 1);
        assert_eq!(sched.stats().tbtt_deferrals, 1);
        assert_eq!(sched.tbtt_order(), &[v0, v1]);
        assert_eq!(e0.status, TbttStatus::TimerProgrammed);
        assert_eq!(sched.platform().timers.get(&TimerId::TbttSwitch), Some(&e0.time));
    }

    #[test]
    fn higher_priority_candidate_displaces_entry() {
        let (mut sched, v0, v1, _, _) = two_channel_setup(100_000, 100_000);
        sched.handle(Event::TbttUpdated { vif: v0, tbtt: Instant::from_micros(200_000) }).unwrap();
        sched.vifs.get_mut(v1).unwrap().tbtt.priority = 3;
        sched.handle(Event::TbttUpdated { vif: v1, tbtt: Instant::from_micros(201_000) }).unwrap();

        let e0 = sched.vif(v0).unwrap().tbtt;
        let e1 = sched.vif(v1).unwrap().tbtt;
        assert_eq!(e1.time, Instant::from_micros(199_000));
        assert_eq!(e0.time, Instant::from_micros(298_000));
        assert_eq!(e0.priority, 1);
        assert_eq!(sched.tbtt_order(), &[v1, v0]);
        // The timer follows the new first entry.
        assert_eq!(e1.status, TbttStatus::TimerProgrammed);
        assert_eq!(e0.status, TbttStatus::Idle);
        assert_eq!(sched.platform().timers.get(&TimerId::TbttSwitch), Some(&e1.time));
    }

    #[test]
    fn scheduled_windows_never_overlap() {
        let mut sched = new_scheduler();
        let vifs: Vec<VifIdx> = (0..4).map(|_| add_station(&mut sched, 100_000)).collect();
        let a = sched.add_context(channel(5180)).unwrap();
        let b = sched.add_context(channel(5200)).unwrap();
        let c = sched.add_context(channel(5220)).unwrap();
        for (&vif, chan) in vifs.iter().zip([a, a, b, c]) {
            sched.link(vif, chan).unwrap();
        }
        settle(&mut sched);

        for (&vif, tbtt) in vifs.iter().zip([200_000, 201_000, 202_000, 200_000]) {
            sched.handle(Event::TbttUpdated { vif, tbtt: Instant::from_micros(tbtt) }).unwrap();
        }
        let times: Vec<u64> = vifs.iter().map(|&v| sched.vif(v).unwrap().tbtt.time.as_micros()).collect();
        assert_eq!(times, vec![198_000, 299_000, 400_000, 498_000]);
        assert_eq!(sched.stats().tbtt_deferrals, 6);

        let assert_disjoint = |sched: &crate::chan::Scheduler<FakePlatform>| {
            let order = sched.tbtt_order();
            for (i, &first) in order.iter().enumerate() {
                for &second in &order[i + 1..] {
                    let (t1, t2) = (sched.vif(first).unwrap().tbtt.time, sched.vif(second).unwrap().tbtt.time);
                    assert!(!sched.tbtt_conflict(t1, t2), "{} at {:?} overlaps {} at {:?}", first, t1, second, t2);
                }
            }
            let present = vifs.iter().filter(|&&v| sched.vif(v).unwrap().tbtt.status == TbttStatus::Presence).count();
            assert!(present <= 1);
        };
        assert_disjoint(&sched);

        // Walk the beacons, ending each presence a millisecond after it started.
        for ms in 150..700u64 {
            run_until(&mut sched, Instant::from_micros(ms * 1_000));
            assert_disjoint(&sched);
            let now = sched.platform().now;
            let ended: Vec<VifIdx> = vifs
                .iter()
                .copied()
                .filter(|&v| {
                    let tbtt = sched.vif(v).unwrap().tbtt;
                    tbtt.status == TbttStatus::Presence && now >= tbtt.time + Duration::from_micros(1_000)
                })
                .collect();
            for vif in ended {
                sched.handle(Event::BeaconPresenceEnded { vif }).unwrap();
                assert_disjoint(&sched);
            }
        }
    }

    #[test]
    fn non_colliding_intervals_alternate_without_deferral() {
        let (mut sched, v0, v1, a, b) = two_channel_setup(100_000, 102_400);
        let mut beacons = Vec::new();
        for k in 0..10u64 {
            beacons.push((200_000 + k * 100_000, v0, 100_000));
            beacons.push((250_000 + k * 102_400, v1, 102_400));
        }
        beacons.sort();
        sched.handle(Event::TbttUpdated { vif: v0, tbtt: Instant::from_micros(200_000) }).unwrap();
        sched.handle(Event::TbttUpdated { vif: v1, tbtt: Instant::from_micros(250_000) }).unwrap();

        for (tbtt, vif, interval) in beacons {
            run_until(&mut sched, Instant::from_micros(tbtt));
            sched.handle(Event::TbttUpdated { vif, tbtt: Instant::from_micros(tbtt + interval) }).unwrap();
            run_until(&mut sched, Instant::from_micros(tbtt + 1_000));
            sched.handle(Event::BeaconPresenceEnded { vif }).unwrap();
        }

        assert_eq!(sched.stats().tbtt_deferrals, 0);
        assert!(sched.stats().distribution_events >= 5);

        run_until_timer(&mut sched, TimerId::Distribution);
        assert!(sched.context(a).unwrap().slots_reserved > 0);
        assert!(sched.context(b).unwrap().slots_reserved > 0);

        let freqs: Vec<u16> = sched.platform().tuned.iter().map(|p| p.prim20_freq).collect();
        let changes = freqs.windows(2).filter(|w| w[0] != w[1]).count();
        assert!(changes >= 10, "radio did not alternate: {:?}", freqs);
        for indication in &sched.platform().indications {
            if let Indication::SwitchComplete { roc, .. } = indication {
                assert!(!roc);
            }
        }
    }

    #[test]
    fn presence_start_switches_and_consumes_reserved_slots() {
        let (mut sched, v0, v1, a, _) = two_channel_setup(100_000, 100_000);
        sched.handle(Event::TbttUpdated { vif: v0, tbtt: Instant::from_micros(200_000) }).unwrap();
        sched.handle(Event::TbttUpdated { vif: v1, tbtt: Instant::from_micros(260_000) }).unwrap();

        run_until(&mut sched, Instant::from_micros(197_000));
        let before = sched.context(a).unwrap().slots_reserved;
        run_until(&mut sched, Instant::from_micros(198_000));
        let entry = sched.vif(v0).unwrap().tbtt;
        assert_eq!(entry.status, TbttStatus::Presence);
        assert_eq!(entry.priority, 0);
        assert_eq!(sched.current_channel(), Some(a));
        assert_eq!(sched.context(a).unwrap().slots_reserved, before.saturating_sub(5));

        // Beacon handled without an update: next window derived from the interval.
        sched.handle(Event::BeaconPresenceEnded { vif: v0 }).unwrap();
        let entry = sched.vif(v0).unwrap().tbtt;
        assert_eq!(entry.time, Instant::from_micros(298_000));
        assert_ne!(entry.status, TbttStatus::Presence);
    }

    #[test]
    fn go_noa_covers_station_channel() {
        let mut sched = new_scheduler();
        let go = sched
            .register_vif(crate::chan::vif::VifConfig {
                kind: VifKind::AccessPoint,
                p2p: true,
                beacon_interval: Duration::from_micros(100_000),
                peer_ap: None,
            })
            .unwrap();
        let sta = add_station(&mut sched, 102_400);
        sched.set_vif_active(go, true).unwrap();
        sched.set_vif_active(sta, true).unwrap();
        sched.set_beacon_received(sta).unwrap();
        let a = sched.add_context(channel(5180)).unwrap();
        let b = sched.add_context(channel(5200)).unwrap();
        sched.link(go, a).unwrap();
        sched.link(sta, b).unwrap();
        settle(&mut sched);

        sched.handle(Event::TbttUpdated { vif: go, tbtt: Instant::from_micros(200_000) }).unwrap();
        sched.handle(Event::TbttUpdated { vif: sta, tbtt: Instant::from_micros(270_000) }).unwrap();
        assert_eq!(sched.tbtt_order(), &[go, sta]);

        run_until(&mut sched, Instant::from_micros(198_000));
        let started = sched.platform().noa_started.clone();
        assert_eq!(started.len(), 1);
        let (vif, counter, interval, duration, start) = started[0];
        assert_eq!(vif, go);
        assert_eq!(counter, NoaCounter::Continuous);
        assert_eq!(interval, Duration::from_micros(102_400));
        // 40 slots on the station channel plus one presence window, since the next GO
        // beacon (298 ms) lands 29 slots after the station TBTT switch time (268 ms).
        assert_eq!(duration, Duration::from_micros((40 + 5) * 1024));
        assert_eq!(start, Instant::from_micros(268_000));
        assert!(sched.vif(go).unwrap().noa.is_some());

        // Dropping back to a single channel stops the NOA.
        sched.unlink(sta).unwrap();
        assert_eq!(sched.platform().noa_stopped, vec![(go, 0)]);
        assert!(sched.vif(go).unwrap().noa.is_none());
    }
}
