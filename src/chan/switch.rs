//! Channel switch state machine.
//!
//! A switch runs `switch_start` -> (idle reached) -> optional absence notices ->
//! `pre_switch` -> `switch_channel`. The target may still change until `pre_switch`:
//! a pending scan or remain-on-channel overrides it and a detected timeout restarts
//! the distribution instead.

use embassy_time::Instant;
use log::{debug, error, warn};

use super::platform::Platform;
use super::scheduler::Scheduler;
use super::types::{ChanIdx, ChanStatus, ChannelSurvey, ContextKind, EnvStatus, Indication, RocRequester, TimerId, VifIdx};
use super::vif::VifKind;

impl<P: Platform> Scheduler<P> {
    /// Move `chan` to `next` and (re)program the context operation timer to match.
    pub(super) fn upd_ctxt_status(&mut self, chan: ChanIdx, next: ChanStatus) {
        let now = self.platform.now();
        let mut next = next;
        let mut expiry: Option<Instant> = None;
        let is_traffic = self.pool[chan].is_traffic();

        match next {
            ChanStatus::GoingIdle if is_traffic => expiry = Some(now + self.config.switch_timeout()),
            ChanStatus::WaitingEnd if is_traffic => {
                let available = self.pool[chan].available_slots();
                if self.scheduled.len() < 2 || available < self.config.min_presence_slots {
                    next = ChanStatus::Present;
                } else {
                    // Re-anchor so the end of presence is never programmed in the past.
                    self.cde_time = now;
                    expiry = Some(now + self.config.slots(available));
                }
            }
            ChanStatus::WaitingEnd => expiry = Some(now + self.config.slots(self.pool[chan].slots_remaining)),
            _ => {}
        }

        self.pool[chan].status = next;
        match expiry {
            Some(at) => {
                self.ctxt_op_target = Some(chan);
                self.platform.arm(TimerId::ContextOperation, at);
            }
            // The switch timeout keeps running while absence notices are confirmed.
            None if next == ChanStatus::WaitingAbsenceConfirm => {}
            None => {
                if self.ctxt_op_target == Some(chan) {
                    self.ctxt_op_target = None;
                    self.platform.disarm(TimerId::ContextOperation);
                }
            }
        }
    }

    /// Start moving the radio to `chan`. Nothing happens if a switch is already in flight;
    /// if the radio is already there only the end-of-presence timer is refreshed.
    pub(super) fn switch_start(&mut self, chan: ChanIdx) {
        // Checked before the current channel: refreshing the presence timer of `chan` while
        // a switch away from it is in flight would replace the switch timeout. A go-idle
        // request always completes before another switch starts.
        if self.switch_in_flight {
            return;
        }
        if self.current == Some(chan) {
            if self.pool[chan].is_traffic() {
                self.upd_ctxt_status(chan, ChanStatus::WaitingEnd);
            }
            return;
        }

        if let Some(current) = self.current {
            if current != self.pool.scan_idx() {
                self.platform.indicate(Indication::PreSwitch { chan: current });
            }
        }

        debug!("Switch to {} started", chan);
        self.switching = Some(chan);
        self.switch_in_flight = true;
        self.stats.switches_started += 1;
        self.upd_ctxt_status(chan, ChanStatus::GoingIdle);
        self.platform.request_idle();
    }

    /// The radio reached idle for the switch in flight.
    pub(super) fn goto_idle_done(&mut self) {
        self.platform.force_idle();
        if self.current.is_some() && !self.status.contains(EnvStatus::TIMEOUT) && self.notify_absence() > 0 {
            return;
        }
        self.pre_switch();
    }

    /// Stations on the channel being left tell their AP they are going to sleep.
    /// Returns the number of confirmations to wait for.
    fn notify_absence(&mut self) -> u8 {
        let Some(current) = self.current else {
            return 0;
        };
        if self.config.capabilities.power_save && self.platform.ps_active() {
            return 0;
        }

        self.platform.set_pwr_mgt(true);
        let targets = self.notice_targets(current);
        let mut sent = 0u8;
        for (vif, peer) in targets {
            let previous = self.pool[current].status;
            self.pool[current].status = ChanStatus::SendingAbsenceNotice;
            if self.platform.send_null_frame(vif, peer, true) {
                sent += 1;
            } else {
                warn!("Absence notice of {} could not be queued", vif);
            }
            self.pool[current].status = previous;
        }

        self.cfm_outstanding = sent;
        self.stats.absence_frames += sent as u64;
        if sent > 0 {
            debug!("Waiting for {} absence confirmations before leaving {}", sent, current);
            if let Some(target) = self.switching {
                self.upd_ctxt_status(target, ChanStatus::WaitingAbsenceConfirm);
            }
            self.platform.set_active();
        }
        sent
    }

    /// Active stations on `chan` with a known AP whose peer is reachable.
    fn notice_targets(&self, chan: ChanIdx) -> Vec<(VifIdx, u8)> {
        self.vifs
            .linked_to(chan)
            .filter(|v| v.kind == VifKind::Station && v.active && (!v.p2p || v.go_present))
            .filter_map(|v| v.peer_ap.map(|peer| (v.index, peer)))
            .collect()
    }

    /// One absence null frame was confirmed.
    pub(super) fn absence_confirmed(&mut self) {
        if self.cfm_outstanding == 0 {
            error!("Absence confirmation without pending notice");
            debug_assert!(false, "unexpected absence confirmation");
            return;
        }
        self.cfm_outstanding -= 1;
        if self.cfm_outstanding == 0 {
            self.platform.force_idle();
            self.pre_switch();
        }
    }

    /// Settle the final switch target and switch.
    fn pre_switch(&mut self) {
        self.switch_in_flight = false;
        if self.ctxt_op_target.take().is_some() {
            self.platform.disarm(TimerId::ContextOperation);
        }

        if self.status.contains(EnvStatus::TIMEOUT) {
            if self.scheduled.len() >= 2 {
                if let Some(target) = self.switching.take() {
                    debug!("Switch to {} dropped after timeout", target);
                    self.pool[target].status = ChanStatus::NotProgrammed;
                }
            }
            self.status.clear(EnvStatus::TIMEOUT);
        }

        let forced = if self.status.contains(EnvStatus::SCAN) {
            Some(self.pool.scan_idx())
        } else if self.status.contains(EnvStatus::ROC) {
            Some(self.pool.roc_idx())
        } else {
            None
        };
        if let Some(forced) = forced {
            if let Some(previous) = self.switching.filter(|&target| target != forced) {
                self.pool[previous].status = ChanStatus::NotProgrammed;
            }
            self.switching = Some(forced);
        }

        if self.switching.is_none() {
            if self.scheduled.len() >= 2 {
                self.cde_evt(true);
            } else if let Some(&only) = self.scheduled.first() {
                self.switching = Some(only);
            }
        }

        if self.switching.is_some() {
            self.switch_channel();
        } else if self.current.is_some() {
            // Nothing to switch to: resume on the channel we never left.
            self.platform.set_active();
        } else {
            self.platform.back_to_host_idle();
        }
    }

    /// Program the radio for the switch target. The radio is idle at this point.
    fn switch_channel(&mut self) {
        let Some(chan) = self.switching else {
            return;
        };
        let ctx = &self.pool[chan];
        let params = ctx.params;
        let kind = ctx.kind;
        let roc = kind == ContextKind::RemainOnChannel && ctx.requester == Some(RocRequester::Host);
        let owner = ctx.owner_vif;

        self.platform.tune(&params);
        self.platform.set_tx_power(params.tx_power);
        if kind != ContextKind::Scan {
            self.platform.indicate(Indication::SwitchComplete { chan, roc, vif: owner });
        }

        self.current = Some(chan);
        self.switching = None;
        self.stats.switches_completed += 1;
        debug!("Radio on {} ({} MHz)", chan, params.prim20_freq);
        self.upd_ctxt_status(chan, ChanStatus::WaitingEnd);

        match kind {
            ContextKind::Traffic => {
                self.notify_presence();
                let linked: Vec<VifIdx> = self.vifs.linked_to(chan).map(|v| v.index).collect();
                for vif in linked {
                    self.platform.note_channel_presence(vif);
                    self.platform.send_postponed_frames(vif);
                }
            }
            ContextKind::Scan => {
                self.platform.reset_cca_busy();
                self.platform.indicate(Indication::ScanChannelStart);
            }
            ContextKind::RemainOnChannel => {}
        }

        if kind != ContextKind::Traffic && self.config.capabilities.power_save {
            // No sleeping and no PM bit while off the operating channels.
            self.platform.set_scan_ongoing(true);
            self.saved_pm = self.platform.pwr_mgt();
            self.platform.set_pwr_mgt(false);
        }

        self.platform.set_active();
    }

    /// Stations on the new channel tell their AP they are back.
    fn notify_presence(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        if self.config.capabilities.power_save && self.platform.ps_active() {
            return;
        }
        self.platform.set_pwr_mgt(false);
        for (vif, peer) in self.notice_targets(current) {
            self.platform.send_null_frame(vif, peer, false);
        }
    }

    /// Context operation timer: switch timeout or end of presence / operation.
    pub(super) fn ctxt_op_evt(&mut self) {
        let Some(chan) = self.ctxt_op_target.take() else {
            return;
        };
        let ctx = &self.pool[chan];
        let (status, is_traffic) = (ctx.status, ctx.is_traffic());
        match status {
            ChanStatus::GoingIdle | ChanStatus::WaitingAbsenceConfirm => {
                warn!("Switch to {} timed out", chan);
                self.stats.switch_timeouts += 1;
                self.status.set(EnvStatus::TIMEOUT);
            }
            ChanStatus::WaitingEnd if is_traffic => self.end_of_presence(chan),
            ChanStatus::WaitingEnd => self.end_of_operation(chan),
            _ => {}
        }
    }

    /// The slots of the current traffic channel are used up.
    fn end_of_presence(&mut self, chan: ChanIdx) {
        self.pool[chan].status = ChanStatus::NotProgrammed;
        let next = if self.scheduled.len() == 1 {
            self.scheduled.first().copied()
        } else if self.scheduled.len() > 1 {
            let now = self.platform.now();
            self.charge_elapsed(chan, now);
            self.cde_time = now;
            self.next_channel()
        } else {
            None
        };
        if let Some(next) = next {
            self.switch_start(next);
        }
    }

    /// A scan or remain-on-channel operation is over: release its context and go back to
    /// the traffic channels.
    pub(super) fn end_of_operation(&mut self, chan: ChanIdx) {
        if self.config.capabilities.power_save {
            self.platform.set_scan_ongoing(false);
            self.platform.set_pwr_mgt(self.saved_pm);
        }
        if self.current == Some(chan) {
            self.current = None;
        }

        let ctx = &self.pool[chan];
        let (kind, requester, owner) = (ctx.kind, ctx.requester, ctx.owner_vif);
        match kind {
            ContextKind::Scan => {
                if self.config.capabilities.hw_scan {
                    self.send_survey(chan);
                }
                self.status.clear(EnvStatus::SCAN);
                self.platform.indicate(Indication::ScanChannelEnd);
            }
            ContextKind::RemainOnChannel => {
                match (requester, owner) {
                    (Some(RocRequester::Host), Some(vif)) => self.platform.indicate(Indication::RocExpired { chan, vif }),
                    (Some(RocRequester::Internal), _) => self.status.clear(EnvStatus::BCN_DETECT),
                    _ => {}
                }
                self.status.clear(EnvStatus::ROC);
            }
            ContextKind::Traffic => {}
        }

        if let Err(e) = self.pool.release(chan) {
            warn!("Cannot release {} after its operation: {}", chan, e);
        }

        if self.status.contains(EnvStatus::ROC_WAIT | EnvStatus::SCAN_WAIT) {
            self.arbitration_prog();
        } else {
            self.status.clear(EnvStatus::DELAY_PROG);
        }

        if self.scheduled.len() == 1 {
            let only = self.scheduled[0];
            self.switch_start(only);
        } else if self.scheduled.len() > 1 {
            self.cde_evt(false);
        } else {
            self.platform.force_idle();
            self.platform.back_to_host_idle();
        }
    }

    fn send_survey(&mut self, chan: ChanIdx) {
        let ctx = &self.pool[chan];
        let airtime = self.config.slots(ctx.slots_total);
        let survey = ChannelSurvey {
            freq: ctx.params.prim20_freq,
            chan_time_ms: (airtime.as_micros() / 1000) as u32,
            chan_time_busy_ms: self.platform.cca_busy_us() / 1000,
            noise_dbm: self.platform.noise_dbm(),
        };
        debug!("Survey of {} MHz: {} ms, {} ms busy", survey.freq, survey.chan_time_ms, survey.chan_time_busy_ms);
        self.platform.indicate(Indication::Survey(survey));
    }
}
