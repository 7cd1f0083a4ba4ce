//! The scheduler object and its public request API.
//!
//! The TBTT list, slot distribution, switch state machine and scan / remain-on-channel
//! arbitration are implemented as further `impl` blocks in the sibling modules.

use embassy_time::{Duration, Instant};
use log::{debug, error, info, warn};
use std::collections::VecDeque;

use super::config::SchedulerConfig;
use super::platform::Platform;
use super::pool::{ChannelContext, ContextPool};
use super::types::{ChanIdx, ChanStatus, ChannelParams, EnvStatus, Event, SchedulerError, SchedulerStats, TbttStatus, TimerId, VifIdx};
use super::vif::{UNDEFINED_TX_POWER, VifConfig, VifEntry, VifTable};

pub struct Scheduler<P: Platform> {
    pub(super) config: SchedulerConfig,
    pub(super) platform: P,
    pub(super) pool: ContextPool,
    pub(super) vifs: VifTable,
    /// Channel the radio is tuned to.
    pub(super) current: Option<ChanIdx>,
    /// Target of the switch in flight. A withdrawn target leaves this empty while the
    /// switch itself runs on to pre-switch.
    pub(super) switching: Option<ChanIdx>,
    /// A switch was started and has not reached pre-switch yet.
    pub(super) switch_in_flight: bool,
    /// Scheduled traffic contexts in scheduling order.
    pub(super) scheduled: Vec<ChanIdx>,
    /// TBTT entries in chronological order, by owning interface.
    pub(super) tbtt_list: Vec<VifIdx>,
    pub(super) tbtt_delayed: VecDeque<VifIdx>,
    /// Length of one distribution event, grows with every linked interface.
    pub(super) cde_duration: Duration,
    /// Reference point for slot accounting on the current channel.
    pub(super) cde_time: Instant,
    /// Deadline last given to the distribution timer.
    pub(super) cde_timer_at: Instant,
    pub(super) status: EnvStatus,
    pub(super) cfm_outstanding: u8,
    pub(super) ctxt_op_target: Option<ChanIdx>,
    pub(super) tbtt_timer_target: Option<VifIdx>,
    /// Power-management bit saved while on a scan or RoC channel.
    pub(super) saved_pm: bool,
    pub(super) stats: SchedulerStats,
}

impl<P: Platform> Scheduler<P> {
    /// Build a scheduler. The configuration is validated first.
    pub fn new(config: SchedulerConfig, platform: P) -> Result<Self, SchedulerError> {
        if let Err(e) = config.validate() {
            error!("Rejected scheduler configuration: {}", e);
            return Err(SchedulerError::InvalidConfig);
        }
        let pool = ContextPool::new(config.traffic_contexts);
        let vifs = VifTable::new(config.max_vifs);
        info!(
            "Channel scheduler ready: {} traffic contexts, {} interfaces, slot {} us",
            config.traffic_contexts, config.max_vifs, config.slot_duration_us
        );
        Ok(Self {
            config,
            platform,
            pool,
            vifs,
            current: None,
            switching: None,
            switch_in_flight: false,
            scheduled: Vec::new(),
            tbtt_list: Vec::new(),
            tbtt_delayed: VecDeque::new(),
            cde_duration: Duration::from_ticks(0),
            cde_time: Instant::from_ticks(0),
            cde_timer_at: Instant::from_ticks(0),
            status: EnvStatus::default(),
            cfm_outstanding: 0,
            ctxt_op_target: None,
            tbtt_timer_target: None,
            saved_pm: false,
            stats: SchedulerStats::default(),
        })
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    pub fn current_channel(&self) -> Option<ChanIdx> {
        self.current
    }

    pub fn switch_target(&self) -> Option<ChanIdx> {
        self.switching
    }

    pub fn context(&self, chan: ChanIdx) -> Option<&ChannelContext> {
        self.pool.get(chan)
    }

    pub fn vif(&self, vif: VifIdx) -> Option<&VifEntry> {
        self.vifs.get(vif)
    }

    pub fn tbtt_order(&self) -> &[VifIdx] {
        &self.tbtt_list
    }

    pub fn free_contexts(&self) -> usize {
        self.pool.free_count()
    }

    pub fn env_status(&self) -> EnvStatus {
        self.status
    }

    /// Whether the radio currently serves `vif`.
    pub fn is_on_channel(&self, vif: VifIdx) -> bool {
        let (Some(current), Some(entry)) = (self.current, self.vifs.get(vif)) else {
            return false;
        };
        let ctx = &self.pool[current];
        if ctx.is_traffic() {
            entry.chan == Some(current)
        } else {
            ctx.owner_vif == Some(vif)
        }
    }

    /// Whether frames may be pushed for `vif`: on its channel and not about to leave it,
    /// except for the absence notices sent right before a switch.
    pub fn is_tx_allowed(&self, vif: VifIdx) -> bool {
        if !self.is_on_channel(vif) {
            return false;
        }
        match self.current {
            Some(current) if self.switch_in_flight => self.pool[current].status == ChanStatus::SendingAbsenceNotice,
            _ => true,
        }
    }

    // ---------------------------------------------------------------------
    // Channel contexts
    // ---------------------------------------------------------------------

    pub fn add_context(&mut self, params: ChannelParams) -> Result<ChanIdx, SchedulerError> {
        self.pool.acquire(&params).inspect_err(|e| warn!("Cannot add channel context for {} MHz: {}", params.prim20_freq, e))
    }

    /// Release a context with no linked interface.
    ///
    /// A context whose last interface was unlinked has already been returned to the pool;
    /// removing it again is accepted and does nothing.
    pub fn remove_context(&mut self, chan: ChanIdx) -> Result<(), SchedulerError> {
        let ctx = self.traffic_context(chan)?;
        if !ctx.in_use {
            debug!("Channel context {} already released", chan);
            return Ok(());
        }
        if ctx.linked_vifs != 0 {
            error!("Channel context {} removed with {} linked interfaces", chan, ctx.linked_vifs);
            debug_assert!(false, "channel context removed while linked");
            return Err(SchedulerError::ContextStillLinked(chan));
        }
        self.release_context(chan)
    }

    /// Change the radio parameters of an in-use context, retuning at once if the radio is on it.
    pub fn update_context(&mut self, chan: ChanIdx, params: ChannelParams) -> Result<(), SchedulerError> {
        let ctx = self.traffic_context(chan)?;
        if !ctx.in_use {
            return Err(SchedulerError::UnknownContext(chan));
        }
        debug!("Updating channel context {} to {} MHz", chan, params.prim20_freq);
        self.pool[chan].params = params;
        if self.current == Some(chan) {
            self.platform.flush_rx();
            self.platform.tune(&params);
            self.platform.set_tx_power(params.tx_power);
        }
        Ok(())
    }

    pub fn link(&mut self, vif: VifIdx, chan: ChanIdx) -> Result<(), SchedulerError> {
        let entry = self.vifs.get(vif).ok_or(SchedulerError::UnknownVif(vif))?;
        if entry.chan.is_some() {
            error!("Interface {} linked twice", vif);
            debug_assert!(false, "interface already linked");
            return Err(SchedulerError::AlreadyLinked(vif));
        }
        let (p2p, go_present) = (entry.p2p, entry.go_present);
        if !self.traffic_context(chan)?.in_use {
            error!("Interface {} linked to unused channel context {}", vif, chan);
            debug_assert!(false, "link to unused channel context");
            return Err(SchedulerError::UnknownContext(chan));
        }

        if let Some(entry) = self.vifs.get_mut(vif) {
            entry.chan = Some(chan);
        }
        self.pool[chan].linked_vifs += 1;
        self.cde_duration += self.config.slots(self.config.vif_slots);
        debug!("Linked {} to {} ({} interfaces)", vif, chan, self.pool[chan].linked_vifs);

        if self.pool[chan].linked_vifs == 1 {
            self.pool[chan].status = ChanStatus::NotProgrammed;
            self.scheduled.push(chan);

            if self.switch_in_flight {
                // A new channel will be chosen once the pending switch reaches pre-switch.
                if let Some(target) = self.switching.take() {
                    debug!("Cancelling switch to {} after new channel {}", target, chan);
                    self.pool[target].status = ChanStatus::NotProgrammed;
                }
            } else if !self.status.contains(EnvStatus::ROC | EnvStatus::SCAN) {
                if self.scheduled.len() == 1 {
                    self.switch_start(chan);
                } else {
                    self.cde_evt(false);
                }
            }
        }

        if p2p {
            let ctx = &mut self.pool[chan];
            ctx.linked_p2p_vifs += 1;
            if go_present {
                ctx.p2p_presences += 1;
            }
        }

        self.update_tx_power(chan);
        Ok(())
    }

    pub fn unlink(&mut self, vif: VifIdx) -> Result<(), SchedulerError> {
        let entry = self.vifs.get(vif).ok_or(SchedulerError::UnknownVif(vif))?;
        let Some(chan) = entry.chan else {
            error!("Interface {} unlinked without a channel context", vif);
            debug_assert!(false, "unlink without channel context");
            return Err(SchedulerError::NotLinked(vif));
        };
        let (p2p, go_present) = (entry.p2p, entry.go_present);

        self.tbtt_list.retain(|&v| v != vif);
        if self.tbtt_timer_target == Some(vif) {
            self.platform.disarm(TimerId::TbttSwitch);
            self.tbtt_timer_target = None;
        }
        if let Some(entry) = self.vifs.get_mut(vif) {
            entry.tbtt.status = TbttStatus::Idle;
            entry.chan = None;
        }
        self.pool[chan].linked_vifs = self.pool[chan].linked_vifs.saturating_sub(1);
        debug!("Unlinked {} from {} ({} interfaces left)", vif, chan, self.pool[chan].linked_vifs);

        if self.pool[chan].status != ChanStatus::NotScheduled {
            if p2p {
                let ctx = &mut self.pool[chan];
                if go_present {
                    ctx.p2p_presences = ctx.p2p_presences.saturating_sub(1);
                }
                ctx.linked_p2p_vifs = ctx.linked_p2p_vifs.saturating_sub(1);
            }
            self.cde_duration = self.cde_duration.checked_sub(self.config.slots(self.config.vif_slots)).unwrap_or(Duration::from_ticks(0));

            if self.pool[chan].linked_vifs == 0 {
                self.unschedule(chan);
            }
        }

        if self.pool[chan].linked_vifs == 0 {
            self.release_context(chan)?;
        }

        self.tbtt_schedule(None);
        self.update_tx_power(chan);
        Ok(())
    }

    fn unschedule(&mut self, chan: ChanIdx) {
        let switch_in_progress = self.switch_in_flight;
        let switching_to_chan = self.switching == Some(chan);

        self.scheduled.retain(|&c| c != chan);
        self.pool[chan].status = ChanStatus::NotScheduled;
        debug!("Channel context {} unscheduled, {} left", chan, self.scheduled.len());

        if self.config.capabilities.p2p_go && self.scheduled.len() == 1 {
            self.stop_all_noa();
        }

        if self.current == Some(chan) {
            self.current = None;
        } else if switching_to_chan {
            self.switching = None;
        }

        if switch_in_progress {
            // Let the switch in flight finish and re-evaluate from pre-switch.
            self.status.set(EnvStatus::TIMEOUT);
        } else if self.scheduled.len() >= 2 {
            self.cde_evt(false);
        } else if let Some(&only) = self.scheduled.first() {
            self.switch_start(only);
        }
    }

    fn release_context(&mut self, chan: ChanIdx) -> Result<(), SchedulerError> {
        if self.ctxt_op_target == Some(chan) {
            self.platform.disarm(TimerId::ContextOperation);
            self.ctxt_op_target = None;
        }
        self.pool.release(chan)
    }

    fn traffic_context(&self, chan: ChanIdx) -> Result<&ChannelContext, SchedulerError> {
        self.pool.get(chan).filter(|ctx| ctx.is_traffic()).ok_or(SchedulerError::UnknownContext(chan))
    }

    /// A context transmits at the lowest power any of its interfaces allows.
    pub(super) fn update_tx_power(&mut self, chan: ChanIdx) {
        if self.pool[chan].linked_vifs == 0 {
            return;
        }
        let min_power = self
            .vifs
            .linked_to(chan)
            .flat_map(|vif| [vif.user_tx_power, vif.tx_power])
            .min()
            .unwrap_or(UNDEFINED_TX_POWER);
        if min_power != UNDEFINED_TX_POWER {
            self.pool[chan].params.tx_power = min_power;
        }
    }

    // ---------------------------------------------------------------------
    // Virtual interfaces
    // ---------------------------------------------------------------------

    pub fn register_vif(&mut self, config: VifConfig) -> Result<VifIdx, SchedulerError> {
        let vif = self.vifs.register(&config)?;
        debug!("Registered {} as {:?} (p2p: {})", vif, config.kind, config.p2p);
        Ok(vif)
    }

    pub fn remove_vif(&mut self, vif: VifIdx) -> Result<(), SchedulerError> {
        self.vifs.remove(vif)?;
        debug!("Removed {}", vif);
        Ok(())
    }

    pub fn set_vif_active(&mut self, vif: VifIdx, active: bool) -> Result<(), SchedulerError> {
        self.vif_mut(vif)?.active = active;
        Ok(())
    }

    pub fn set_beacon_received(&mut self, vif: VifIdx) -> Result<(), SchedulerError> {
        self.vif_mut(vif)?.beacon_received = true;
        Ok(())
    }

    pub fn set_peer_ap(&mut self, vif: VifIdx, peer: Option<u8>) -> Result<(), SchedulerError> {
        self.vif_mut(vif)?.peer_ap = peer;
        Ok(())
    }

    pub fn set_beacon_interval(&mut self, vif: VifIdx, interval: Duration) -> Result<(), SchedulerError> {
        if interval.as_micros() == 0 {
            return Err(SchedulerError::InvalidBeaconInterval);
        }
        self.vif_mut(vif)?.beacon_interval = interval;
        Ok(())
    }

    /// Regulatory power limit of the interface, `None` when unconstrained.
    pub fn set_vif_tx_power(&mut self, vif: VifIdx, dbm: Option<i8>) -> Result<(), SchedulerError> {
        let entry = self.vif_mut(vif)?;
        entry.tx_power = dbm.unwrap_or(UNDEFINED_TX_POWER);
        let chan = entry.chan;
        if let Some(chan) = chan {
            self.update_tx_power(chan);
        }
        Ok(())
    }

    /// Power requested by the user for the interface, `None` when unconstrained.
    pub fn set_vif_user_tx_power(&mut self, vif: VifIdx, dbm: Option<i8>) -> Result<(), SchedulerError> {
        let entry = self.vif_mut(vif)?;
        entry.user_tx_power = dbm.unwrap_or(UNDEFINED_TX_POWER);
        let chan = entry.chan;
        if let Some(chan) = chan {
            self.update_tx_power(chan);
        }
        Ok(())
    }

    fn vif_mut(&mut self, vif: VifIdx) -> Result<&mut VifEntry, SchedulerError> {
        self.vifs.get_mut(vif).ok_or(SchedulerError::UnknownVif(vif))
    }

    // ---------------------------------------------------------------------
    // Event dispatch
    // ---------------------------------------------------------------------

    /// Run the scheduler to completion for one asynchronous event.
    pub fn handle(&mut self, event: Event) -> Result<(), SchedulerError> {
        match event {
            Event::TimerExpired(TimerId::TbttSwitch) => {
                if let Some(vif) = self.tbtt_timer_target.take() {
                    self.tbtt_switch_evt(vif);
                }
            }
            Event::TimerExpired(TimerId::Distribution) => self.cde_evt(false),
            Event::TimerExpired(TimerId::ContextOperation) => self.ctxt_op_evt(),
            Event::TimerExpired(TimerId::Arbitration) => self.arbitration_evt(),
            Event::IdleReached => self.goto_idle_done(),
            Event::NullFrameConfirmed => self.absence_confirmed(),
            Event::TbttUpdated { vif, tbtt } => self.tbtt_updated(vif, tbtt)?,
            Event::BeaconPresenceEnded { vif } => self.beacon_presence_ended(vif)?,
            Event::P2pGoPresence { vif, present } => self.p2p_go_presence(vif, present)?,
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Slot accounting helpers
    // ---------------------------------------------------------------------

    /// Whole slots from `earlier` to `later`, negative when `later` comes first.
    pub(super) fn slots_between(&self, later: Instant, earlier: Instant) -> i64 {
        let diff = later.as_micros() as i64 - earlier.as_micros() as i64;
        diff / self.config.slot_duration_us as i64
    }

    /// Slots elapsed since the last accounting point, clamped to zero.
    pub(super) fn elapsed_slots(&self, now: Instant) -> u16 {
        self.slots_between(now, self.cde_time).clamp(0, u16::MAX as i64) as u16
    }

    /// Charge the slots used since the last accounting point to `chan`.
    pub(super) fn charge_elapsed(&mut self, chan: ChanIdx, now: Instant) {
        let used = self.elapsed_slots(now);
        let ctx = &mut self.pool[chan];
        ctx.slots_remaining -= used.min(ctx.slots_remaining);
        ctx.slots_reserved = ctx.slots_reserved.min(ctx.slots_remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chan::test_support::*;
    use crate::chan::types::Indication;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = SchedulerConfig {
            vif_slots: 3,
            ..SchedulerConfig::default()
        };
        assert_eq!(Scheduler::new(config, FakePlatform::default()).err(), Some(SchedulerError::InvalidConfig));
        let config = SchedulerConfig {
            vif_slots: 20_000,
            ..SchedulerConfig::default()
        };
        assert_eq!(Scheduler::new(config, FakePlatform::default()).err(), Some(SchedulerError::InvalidConfig));
    }

    #[test]
    fn first_link_switches_to_the_channel() {
        let mut sched = new_scheduler();
        let vif = add_station(&mut sched, 102_400);
        let chan = sched.add_context(channel(5180)).unwrap();
        sched.link(vif, chan).unwrap();
        assert_eq!(sched.switch_target(), Some(chan));
        assert_eq!(sched.platform().idle_requests, 1);

        settle(&mut sched);
        assert_eq!(sched.current_channel(), Some(chan));
        assert_eq!(sched.switch_target(), None);
        // A single scheduled channel has no end-of-presence timer.
        assert_eq!(sched.context(chan).unwrap().status, ChanStatus::Present);
        assert!(!sched.platform().timers.contains_key(&TimerId::ContextOperation));
        assert_eq!(sched.platform().tuned.last().map(|p| p.prim20_freq), Some(5180));
        assert!(sched.platform().indications.contains(&Indication::SwitchComplete { chan, roc: false, vif: None }));
    }

    #[test]
    fn add_link_unlink_remove_round_trip() {
        let mut sched = new_scheduler();
        let vif = add_station(&mut sched, 102_400);
        let free_before = sched.free_contexts();

        let chan = sched.add_context(channel(5180)).unwrap();
        sched.link(vif, chan).unwrap();
        settle(&mut sched);
        assert_eq!(sched.scheduled_count(), 1);

        sched.unlink(vif).unwrap();
        sched.remove_context(chan).unwrap();
        settle(&mut sched);
        assert_eq!(sched.free_contexts(), free_before);
        assert_eq!(sched.scheduled_count(), 0);
        assert_eq!(sched.current_channel(), None);
    }

    #[test]
    fn contract_violations_surface_as_errors() {
        let mut sched = new_scheduler();
        let vif = add_station(&mut sched, 102_400);
        assert_eq!(sched.link(vif, ChanIdx(7)), Err(SchedulerError::UnknownContext(ChanIdx(7))));
        assert_eq!(sched.link(VifIdx(3), ChanIdx(0)), Err(SchedulerError::UnknownVif(VifIdx(3))));
        let chan = sched.add_context(channel(5180)).unwrap();
        sched.link(vif, chan).unwrap();
        assert_eq!(sched.remove_vif(vif), Err(SchedulerError::VifStillLinked(vif)));
    }

    #[test]
    fn pool_exhaustion_does_not_mutate_state() {
        let mut sched = new_scheduler();
        for freq in [5180, 5200, 5220] {
            sched.add_context(channel(freq)).unwrap();
        }
        assert_eq!(sched.add_context(channel(5240)), Err(SchedulerError::PoolExhausted));
        assert_eq!(sched.free_contexts(), 0);
        assert_eq!(sched.scheduled_count(), 0);
        // Same channel at another power is still served by the existing context.
        let mut params = channel(5200);
        params.tx_power = 3;
        assert_eq!(sched.add_context(params), Ok(ChanIdx(1)));
    }

    #[test]
    fn tx_power_is_minimum_over_linked_interfaces() {
        let mut sched = new_scheduler();
        let a = add_station(&mut sched, 102_400);
        let b = add_station(&mut sched, 102_400);
        let chan = sched.add_context(channel(5180)).unwrap();
        sched.link(a, chan).unwrap();
        sched.link(b, chan).unwrap();
        assert_eq!(sched.context(chan).unwrap().params.tx_power, 20);

        sched.set_vif_tx_power(a, Some(15)).unwrap();
        sched.set_vif_user_tx_power(b, Some(10)).unwrap();
        assert_eq!(sched.context(chan).unwrap().params.tx_power, 10);
    }

    #[test]
    fn update_context_retunes_current_channel() {
        let mut sched = new_scheduler();
        let vif = add_station(&mut sched, 102_400);
        let chan = sched.add_context(channel(5180)).unwrap();
        sched.link(vif, chan).unwrap();
        settle(&mut sched);

        let mut params = channel(5180);
        params.bandwidth = crate::chan::types::Bandwidth::Mhz40;
        params.center1_freq = 5190;
        sched.update_context(chan, params).unwrap();
        assert_eq!(sched.platform().flush_rx_calls, 1);
        assert_eq!(sched.platform().tuned.last(), Some(&params));
    }

    #[test]
    fn tx_allowed_only_on_channel_and_outside_switches() {
        let mut sched = new_scheduler();
        let a = add_station(&mut sched, 102_400);
        let b = add_station(&mut sched, 102_400);
        let chan_a = sched.add_context(channel(5180)).unwrap();
        let chan_b = sched.add_context(channel(5200)).unwrap();
        sched.link(a, chan_a).unwrap();
        settle(&mut sched);
        assert!(sched.is_on_channel(a));
        assert!(sched.is_tx_allowed(a));
        assert!(!sched.is_on_channel(b));

        sched.platform_mut().deliver_hw = false;
        sched.link(b, chan_b).unwrap();
        assert_eq!(sched.switch_target(), Some(chan_b));
        assert!(sched.is_on_channel(a));
        assert!(!sched.is_tx_allowed(a));
    }

    #[test]
    fn scheduled_count_matches_linked_contexts() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut sched = new_scheduler();
        let vifs: Vec<VifIdx> = (0..4).map(|_| add_station(&mut sched, 102_400)).collect();
        let freqs = [5180u16, 5200, 5220];

        for _ in 0..400 {
            let vif = vifs[rng.gen_range(0..vifs.len())];
            if sched.vif(vif).unwrap().chan.is_some() {
                sched.unlink(vif).unwrap();
            } else {
                let freq = freqs[rng.gen_range(0..freqs.len())];
                let chan = sched.add_context(channel(freq)).unwrap();
                sched.link(vif, chan).unwrap();
            }
            let until = sched.platform().now + Duration::from_micros(rng.gen_range(0..60_000));
            run_until(&mut sched, until);

            let linked: std::collections::BTreeSet<ChanIdx> = vifs.iter().filter_map(|&v| sched.vif(v).unwrap().chan).collect();
            assert_eq!(sched.scheduled_count(), linked.len());
            for ctx in sched.pool.traffic_contexts() {
                assert_eq!(ctx.in_use, ctx.linked_vifs > 0, "context {} leaked", ctx.index);
                assert!(ctx.slots_remaining <= ctx.slots_total);
                assert!(ctx.slots_reserved <= ctx.slots_remaining);
            }
        }

        for &vif in &vifs {
            if sched.vif(vif).unwrap().chan.is_some() {
                sched.unlink(vif).unwrap();
            }
        }
        settle(&mut sched);
        assert_eq!(sched.scheduled_count(), 0);
        assert_eq!(sched.free_contexts(), 3);
    }
}
