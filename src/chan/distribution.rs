//! Channel Distribution Events.
//!
//! Once two or more traffic channels are scheduled, airtime is cut into periods of
//! `vif_slots` slots per linked interface. At the start of each period the slots are
//! shared out from the traffic-detection status of every interface, part of each
//! channel's share is reserved for beacon presence, and the radio is sent to the channel
//! that needs it first.

use log::{debug, warn};

use super::platform::Platform;
use super::scheduler::Scheduler;
use super::types::{ChanIdx, ChanStatus, EnvStatus, TbttStatus, TimerId, VifIdx};

impl<P: Platform> Scheduler<P> {
    /// Start a distribution event.
    ///
    /// With `restart` set the event is started from pre-switch: the chosen channel becomes
    /// the switch target directly instead of starting a new switch.
    pub(super) fn cde_evt(&mut self, restart: bool) {
        if self.scheduled.len() < 2 {
            return;
        }
        if self.status.contains(EnvStatus::ROC | EnvStatus::SCAN) {
            debug!("Distribution deferred until the scan / remain-on-channel operation ends");
            return;
        }
        if self.status.contains(EnvStatus::TIMEOUT) {
            debug!("Distribution deferred until the timed out switch completes");
            return;
        }

        let now = self.platform.now();
        self.cde_timer_at = now + self.cde_duration;
        self.platform.arm(TimerId::Distribution, self.cde_timer_at);
        self.cde_time = now;
        self.stats.distribution_events += 1;

        self.distribute_slots();

        if let Some(current) = self.current {
            self.upd_ctxt_status(current, ChanStatus::NotProgrammed);
        }

        let next = self.next_channel();
        debug!("Distribution event at {} us, first channel {:?}", now.as_micros(), next);
        if restart {
            self.switching = next;
        } else if let Some(next) = next {
            self.switch_start(next);
        }
    }

    /// Share the slots of one distribution event between the scheduled contexts.
    pub(super) fn distribute_slots(&mut self) {
        let linked: Vec<(VifIdx, ChanIdx, bool)> = self
            .vifs
            .iter()
            .filter_map(|v| v.chan.map(|chan| (v.index, chan, self.platform.traffic_detected(v.index) || !v.active)))
            .collect();

        for &(_, chan, _) in &linked {
            let ctx = &mut self.pool[chan];
            ctx.slots_total = 0;
            ctx.slots_reserved = 0;
        }

        let nb_vifs = linked.len() as u16;
        let nb_traffic = linked.iter().filter(|(_, _, traffic)| *traffic).count() as u16;
        let expected = self.cde_duration.as_micros() / self.config.slots(self.config.vif_slots).as_micros();
        if nb_vifs as u64 != expected {
            warn!("{} linked interfaces but distribution sized for {}", nb_vifs, expected);
        }

        let vif_slots = self.config.vif_slots;
        let presence = self.config.tbtt_presence_slots;
        let (idle_slots, extra) = if nb_traffic == 0 || nb_traffic == nb_vifs {
            (vif_slots, 0)
        } else {
            let pooled = (nb_vifs - nb_traffic) as u32 * vif_slots.saturating_sub(presence) as u32 / nb_traffic as u32;
            (presence, pooled.min(u16::MAX as u32) as u16)
        };

        let cde_us = self.cde_duration.as_micros();
        for (vif, chan, traffic) in linked {
            let interval_us = self.vifs.get(vif).map(|v| v.beacon_interval.as_micros()).unwrap_or(1).max(1);
            let tbtts = (cde_us / interval_us).max(1) as u16;
            let ctx = &mut self.pool[chan];
            let share = if traffic { vif_slots.saturating_add(extra) } else { idle_slots };
            ctx.slots_total = ctx.slots_total.saturating_add(share);
            ctx.slots_remaining = ctx.slots_total;
            ctx.slots_reserved = ctx.slots_reserved.saturating_add(tbtts.saturating_mul(presence));
        }

        for &chan in &self.scheduled {
            let ctx = &mut self.pool[chan];
            ctx.slots_reserved = ctx.slots_reserved.min(ctx.slots_remaining);
            debug!("{}: {} slots, {} reserved", chan, ctx.slots_total, ctx.slots_reserved);
        }
    }

    /// Traffic channel the radio should serve next. Defaults to the current channel.
    pub(super) fn next_channel(&self) -> Option<ChanIdx> {
        let now = self.platform.now();
        let min_presence = self.config.slots(self.config.min_presence_slots);
        let first_tbtt = self.tbtt_list.first().and_then(|&v| self.vifs.get(v)).map(|v| (v.tbtt, v.chan));
        let p2p_enabled = self.config.capabilities.p2p;

        let p2p_chan = if p2p_enabled { self.next_p2p_channel() } else { None };

        if let Some(current) = self.current {
            if first_tbtt.is_some_and(|(tbtt, _)| tbtt.status == TbttStatus::Presence) {
                return Some(current);
            }
            if now + min_presence >= self.cde_timer_at {
                // Not enough of this event left to be worth a switch.
                return Some(current);
            }
            let ctx = &self.pool[current];
            let p2p_priority = p2p_enabled && ctx.linked_p2p_vifs == 0 && p2p_chan.is_some();
            if !p2p_priority && ctx.status == ChanStatus::WaitingEnd {
                return Some(current);
            }
        }

        if let Some((tbtt, Some(tbtt_chan))) = first_tbtt.filter(|(tbtt, _)| tbtt.time < self.cde_timer_at) {
            if now + min_presence >= tbtt.time {
                return Some(tbtt_chan);
            }
            if let Some(p2p_chan) = p2p_chan {
                return Some(p2p_chan);
            }
            let ctx = &self.pool[tbtt_chan];
            if !(p2p_enabled && ctx.linked_p2p_vifs > 0) && ctx.available_slots() as i64 >= self.slots_between(tbtt.time, now) {
                return Some(tbtt_chan);
            }
        } else if let Some(p2p_chan) = p2p_chan {
            return Some(p2p_chan);
        }

        let mut best = self.current;
        let mut best_remaining = 0;
        for ctx in self.pool.traffic_contexts() {
            if ctx.status == ChanStatus::NotScheduled || ctx.slots_remaining < best_remaining {
                continue;
            }
            if p2p_enabled && p2p_chan.is_none() && ctx.linked_p2p_vifs > 0 {
                continue;
            }
            best = Some(ctx.index);
            best_remaining = ctx.slots_remaining;
        }
        best
    }

    /// Scheduled channel with a present P2P peer and the most available slots.
    pub(super) fn next_p2p_channel(&self) -> Option<ChanIdx> {
        if self.vifs.p2p_count() == 0 {
            return None;
        }
        let mut best = None;
        let mut best_available = 0;
        for &chan in &self.scheduled {
            let ctx = &self.pool[chan];
            if ctx.p2p_presences == 0 {
                continue;
            }
            let available = ctx.available_slots();
            if available < self.config.min_presence_slots {
                continue;
            }
            if available > best_available {
                best_available = available;
                best = Some(chan);
            }
        }
        best
    }
}
