//! Scan, remain-on-channel and P2P presence handling.
//!
//! Host scan and remain-on-channel requests wait for a short arbitration delay so that
//! simultaneous requests can be ordered; remain-on-channel is served first. Internal
//! requests (beacon detection) skip the delay.

use embassy_time::Duration;
use log::{debug, info};

use super::platform::Platform;
use super::scheduler::Scheduler;
use super::types::{Band, ChanStatus, ChannelParams, EnvStatus, Indication, RocOp, RocRequest, RocRequester, SchedulerError, TimerId, VifIdx};

impl<P: Platform> Scheduler<P> {
    pub(super) fn arbitration_prog(&mut self) {
        self.status.set(EnvStatus::DELAY_PROG);
        let at = self.platform.now() + self.config.arbitration_delay();
        self.platform.arm(TimerId::Arbitration, at);
    }

    pub(super) fn arbitration_evt(&mut self) {
        let chan = if self.status.contains(EnvStatus::ROC_WAIT) {
            debug_assert!(!self.status.contains(EnvStatus::ROC), "remain-on-channel already running");
            self.status.clear(EnvStatus::ROC_WAIT);
            self.status.set(EnvStatus::ROC);
            self.pool.roc_idx()
        } else if self.status.contains(EnvStatus::SCAN_WAIT) {
            debug_assert!(!self.status.contains(EnvStatus::SCAN), "scan already running");
            self.status.clear(EnvStatus::SCAN_WAIT);
            self.status.set(EnvStatus::SCAN);
            self.pool.scan_idx()
        } else {
            return;
        };
        debug!("Arbitration grants {}", chan);
        // A switch in flight picks up the operation at pre-switch.
        self.switch_start(chan);
    }

    /// Queue a visit of `freq` for `duration` on behalf of `vif`.
    pub fn scan_request(&mut self, band: Band, freq: u16, tx_power: i8, duration: Duration, vif: VifIdx) -> Result<(), SchedulerError> {
        let chan = self.pool.scan_idx();
        if self.pool[chan].in_use {
            return Err(SchedulerError::ScanBusy);
        }
        let slots = self.config.slots_in(duration);
        let ctx = &mut self.pool[chan];
        ctx.in_use = true;
        ctx.params = ChannelParams::single(band, freq, tx_power);
        ctx.owner_vif = Some(vif);
        ctx.requester = None;
        ctx.status = ChanStatus::NotProgrammed;
        ctx.slots_total = slots;
        ctx.slots_remaining = slots;
        debug!("Scan of {} MHz for {} requested", freq, vif);

        self.status.set(EnvStatus::SCAN_WAIT);
        if !self.status.contains(EnvStatus::DELAY_PROG) {
            self.arbitration_prog();
        }
        Ok(())
    }

    /// Start or cancel a remain-on-channel operation.
    pub fn remain_on_channel(&mut self, op: RocOp, requester: RocRequester) -> Result<(), SchedulerError> {
        match op {
            RocOp::Start(request) => self.roc_start(request, requester),
            RocOp::Cancel => self.roc_cancel(),
        }
    }

    fn roc_start(&mut self, request: RocRequest, requester: RocRequester) -> Result<(), SchedulerError> {
        let chan = self.pool.roc_idx();
        if self.pool[chan].in_use {
            return Err(SchedulerError::RocBusy);
        }
        let slots = self.config.slots_in(request.duration);
        let ctx = &mut self.pool[chan];
        ctx.in_use = true;
        ctx.params = request.params;
        ctx.owner_vif = Some(request.vif);
        ctx.requester = Some(requester);
        ctx.status = ChanStatus::NotProgrammed;
        ctx.slots_total = slots;
        ctx.slots_remaining = slots;
        info!(
            "Remain on {} MHz for {} ms ({:?} request for {})",
            request.params.prim20_freq,
            request.duration.as_millis(),
            requester,
            request.vif
        );

        match requester {
            RocRequester::Internal => {
                self.status.set(EnvStatus::ROC);
                self.switch_start(chan);
            }
            RocRequester::Host => {
                self.status.set(EnvStatus::ROC_WAIT);
                if !self.status.contains(EnvStatus::DELAY_PROG) {
                    self.arbitration_prog();
                }
            }
        }
        Ok(())
    }

    fn roc_cancel(&mut self) -> Result<(), SchedulerError> {
        let chan = self.pool.roc_idx();
        let ctx = &self.pool[chan];
        if !ctx.in_use {
            return Err(SchedulerError::RocNotActive);
        }
        let (status, requester, owner) = (ctx.status, ctx.requester, ctx.owner_vif);
        debug!("Remain-on-channel cancelled in {:?}", status);

        match status {
            ChanStatus::NotProgrammed => {
                self.status.clear(EnvStatus::ROC_WAIT | EnvStatus::ROC);
                match (requester, owner) {
                    (Some(RocRequester::Host), Some(vif)) => self.platform.indicate(Indication::RocExpired { chan, vif }),
                    (Some(RocRequester::Internal), _) => self.status.clear(EnvStatus::BCN_DETECT),
                    _ => {}
                }
            }
            ChanStatus::GoingIdle | ChanStatus::WaitingAbsenceConfirm => {
                // Only the target is withdrawn: the switch keeps waiting for idle and for
                // its absence confirmations, then picks a new target at pre-switch.
                self.status.clear(EnvStatus::ROC);
                if requester == Some(RocRequester::Internal) {
                    self.status.clear(EnvStatus::BCN_DETECT);
                }
                if self.switching == Some(chan) {
                    self.switching = None;
                }
            }
            ChanStatus::WaitingEnd => {
                if self.ctxt_op_target.take().is_some() {
                    self.platform.disarm(TimerId::ContextOperation);
                }
                self.end_of_operation(chan);
            }
            _ => {}
        }

        if self.pool[chan].in_use {
            self.pool.release(chan)?;
        }
        if self.status.contains(EnvStatus::DELAY_PROG) && !self.status.contains(EnvStatus::SCAN_WAIT) {
            self.status.clear(EnvStatus::DELAY_PROG);
            self.platform.disarm(TimerId::Arbitration);
        }
        Ok(())
    }

    /// Listen on the channel of `vif` for most of a beacon interval to pick up its beacons.
    ///
    /// Returns `true` if a detection was started.
    pub fn start_beacon_detection(&mut self, vif: VifIdx) -> Result<bool, SchedulerError> {
        let entry = self.vifs.get(vif).ok_or(SchedulerError::UnknownVif(vif))?;
        let chan = entry.chan.ok_or(SchedulerError::NotLinked(vif))?;
        if self.status.contains(EnvStatus::BCN_DETECT) || self.scheduled.len() <= 1 {
            return Ok(false);
        }
        let listen = entry.beacon_interval.checked_sub(self.config.beacon_detect_margin()).unwrap_or(Duration::from_ticks(0));
        let request = RocRequest {
            params: self.pool[chan].params,
            duration: Duration::from_millis(listen.as_millis()),
            vif,
        };
        self.remain_on_channel(RocOp::Start(request), RocRequester::Internal)?;
        self.status.set(EnvStatus::BCN_DETECT);
        Ok(true)
    }

    /// The GO of P2P client `vif` became present or absent.
    pub(super) fn p2p_go_presence(&mut self, vif: VifIdx, present: bool) -> Result<(), SchedulerError> {
        let entry = self.vifs.get_mut(vif).ok_or(SchedulerError::UnknownVif(vif))?;
        if !entry.p2p || entry.go_present == present {
            return Ok(());
        }
        entry.go_present = present;
        let Some(chan) = entry.chan else {
            return Ok(());
        };
        let ctx = &mut self.pool[chan];
        if present {
            ctx.p2p_presences += 1;
        } else {
            ctx.p2p_presences = ctx.p2p_presences.saturating_sub(1);
        }
        debug!("GO of {} {}", vif, if present { "present" } else { "absent" });

        if self.scheduled.len() < 2 || self.status.contains(EnvStatus::ROC | EnvStatus::SCAN) || self.switch_in_flight {
            return Ok(());
        }
        let Some(current) = self.current else {
            return Ok(());
        };
        if self.pool[current].p2p_presences > 0 {
            return Ok(());
        }
        if !present {
            if current != chan {
                return Ok(());
            }
            self.pool[chan].status = ChanStatus::Present;
        }

        if let Some(next) = self.next_channel() {
            if next != current {
                let now = self.platform.now();
                self.charge_elapsed(current, now);
                self.cde_time = now;
                self.switch_start(next);
            }
        }
        Ok(())
    }
}
