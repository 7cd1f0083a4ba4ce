//! Channel context pool.
//!
//! A fixed arena of contexts addressed by [`ChanIdx`]. The first `traffic` entries are
//! handed out through a free list; the two entries after them are permanently reserved
//! for the scan channel and the remain-on-channel operation.

use log::debug;
use std::collections::VecDeque;
use std::ops::{Index, IndexMut};

use super::types::{ChanIdx, ChanStatus, ChannelParams, ContextKind, RocRequester, SchedulerError, VifIdx};

#[derive(Debug, Clone)]
pub struct ChannelContext {
    pub index: ChanIdx,
    pub kind: ContextKind,
    pub in_use: bool,
    pub params: ChannelParams,
    pub status: ChanStatus,
    /// Slots granted for the current distribution event.
    pub slots_total: u16,
    pub slots_remaining: u16,
    /// Part of the remaining slots kept for beacon presence.
    pub slots_reserved: u16,
    pub linked_vifs: u8,
    pub linked_p2p_vifs: u8,
    /// P2P links on this channel whose peer is currently present.
    pub p2p_presences: u8,
    /// Interface a scan or remain-on-channel operation is performed for.
    pub owner_vif: Option<VifIdx>,
    pub requester: Option<RocRequester>,
}

impl ChannelContext {
    fn new(index: ChanIdx, kind: ContextKind) -> Self {
        Self {
            index,
            kind,
            in_use: false,
            params: ChannelParams::default(),
            status: ChanStatus::NotScheduled,
            slots_total: 0,
            slots_remaining: 0,
            slots_reserved: 0,
            linked_vifs: 0,
            linked_p2p_vifs: 0,
            p2p_presences: 0,
            owner_vif: None,
            requester: None,
        }
    }

    /// Remaining slots not held back for beacon presence.
    pub fn available_slots(&self) -> u16 {
        self.slots_remaining.saturating_sub(self.slots_reserved)
    }

    pub fn is_traffic(&self) -> bool {
        self.kind == ContextKind::Traffic
    }
}

#[derive(Debug)]
pub struct ContextPool {
    contexts: Vec<ChannelContext>,
    free: VecDeque<ChanIdx>,
    traffic: u8,
}

impl ContextPool {
    pub fn new(traffic: u8) -> Self {
        let mut contexts: Vec<ChannelContext> = (0..traffic).map(|i| ChannelContext::new(ChanIdx(i), ContextKind::Traffic)).collect();
        contexts.push(ChannelContext::new(ChanIdx(traffic), ContextKind::Scan));
        contexts.push(ChannelContext::new(ChanIdx(traffic + 1), ContextKind::RemainOnChannel));
        Self {
            contexts,
            free: (0..traffic).map(ChanIdx).collect(),
            traffic,
        }
    }

    pub fn scan_idx(&self) -> ChanIdx {
        ChanIdx(self.traffic)
    }

    pub fn roc_idx(&self) -> ChanIdx {
        ChanIdx(self.traffic + 1)
    }

    pub fn traffic_count(&self) -> u8 {
        self.traffic
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn get(&self, idx: ChanIdx) -> Option<&ChannelContext> {
        self.contexts.get(idx.0 as usize)
    }

    pub fn get_mut(&mut self, idx: ChanIdx) -> Option<&mut ChannelContext> {
        self.contexts.get_mut(idx.0 as usize)
    }

    /// Traffic contexts in pool order, used or not.
    pub fn traffic_contexts(&self) -> impl Iterator<Item = &ChannelContext> {
        self.contexts.iter().take(self.traffic as usize)
    }

    /// In-use traffic context whose parameters match `params` except for transmit power.
    pub fn find_matching(&self, params: &ChannelParams) -> Option<ChanIdx> {
        self.traffic_contexts().find(|ctx| ctx.in_use && ctx.params.same_channel(params)).map(|ctx| ctx.index)
    }

    /// Return a context for `params`, reusing a matching one when possible.
    pub fn acquire(&mut self, params: &ChannelParams) -> Result<ChanIdx, SchedulerError> {
        if let Some(idx) = self.find_matching(params) {
            debug!("Reusing channel context {} for {} MHz", idx, params.prim20_freq);
            return Ok(idx);
        }
        let idx = self.free.pop_front().ok_or(SchedulerError::PoolExhausted)?;
        let ctx = &mut self.contexts[idx.0 as usize];
        ctx.in_use = true;
        ctx.params = *params;
        debug!("Allocated channel context {} for {} MHz", idx, params.prim20_freq);
        Ok(idx)
    }

    /// Give a traffic context back to the free list, or mark the scan / RoC context unused.
    pub fn release(&mut self, idx: ChanIdx) -> Result<(), SchedulerError> {
        let ctx = self.contexts.get_mut(idx.0 as usize).ok_or(SchedulerError::UnknownContext(idx))?;
        if !ctx.in_use {
            return Err(SchedulerError::UnknownContext(idx));
        }
        if ctx.linked_vifs != 0 {
            return Err(SchedulerError::ContextStillLinked(idx));
        }
        let kind = ctx.kind;
        *ctx = ChannelContext::new(idx, kind);
        if kind == ContextKind::Traffic {
            self.free.push_back(idx);
        }
        debug!("Released channel context {}", idx);
        Ok(())
    }
}

impl Index<ChanIdx> for ContextPool {
    type Output = ChannelContext;

    fn index(&self, idx: ChanIdx) -> &ChannelContext {
        &self.contexts[idx.0 as usize]
    }
}

impl IndexMut<ChanIdx> for ContextPool {
    fn index_mut(&mut self, idx: ChanIdx) -> &mut ChannelContext {
        &mut self.contexts[idx.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chan::types::Band;

    fn params(freq: u16, power: i8) -> ChannelParams {
        ChannelParams::single(Band::Ghz5, freq, power)
    }

    #[test]
    fn reserved_contexts_follow_traffic_ones() {
        let pool = ContextPool::new(3);
        assert_eq!(pool.scan_idx(), ChanIdx(3));
        assert_eq!(pool.roc_idx(), ChanIdx(4));
        assert_eq!(pool.get(ChanIdx(3)).unwrap().kind, ContextKind::Scan);
        assert_eq!(pool.get(ChanIdx(4)).unwrap().kind, ContextKind::RemainOnChannel);
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn acquire_reuses_channel_with_different_power() {
        let mut pool = ContextPool::new(3);
        let a = pool.acquire(&params(5180, 20)).unwrap();
        let b = pool.acquire(&params(5180, 10)).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.free_count(), 2);
        let c = pool.acquire(&params(5200, 20)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn exhaustion_leaves_pool_untouched() {
        let mut pool = ContextPool::new(2);
        pool.acquire(&params(5180, 20)).unwrap();
        pool.acquire(&params(5200, 20)).unwrap();
        assert_eq!(pool.acquire(&params(5220, 20)), Err(SchedulerError::PoolExhausted));
        assert_eq!(pool.free_count(), 0);
        assert!(pool.find_matching(&params(5220, 20)).is_none());
    }

    #[test]
    fn release_round_trip() {
        let mut pool = ContextPool::new(3);
        let idx = pool.acquire(&params(5180, 20)).unwrap();
        pool.get_mut(idx).unwrap().linked_vifs = 1;
        assert_eq!(pool.release(idx), Err(SchedulerError::ContextStillLinked(idx)));
        pool.get_mut(idx).unwrap().linked_vifs = 0;
        assert_eq!(pool.release(idx), Ok(()));
        assert_eq!(pool.free_count(), 3);
        assert!(!pool.get(idx).unwrap().in_use);
        assert_eq!(pool.release(idx), Err(SchedulerError::UnknownContext(idx)));
    }

    #[test]
    fn available_slots_never_underflow() {
        let mut pool = ContextPool::new(1);
        let ctx = pool.get_mut(ChanIdx(0)).unwrap();
        ctx.slots_remaining = 3;
        ctx.slots_reserved = 5;
        assert_eq!(ctx.available_slots(), 0);
    }
}
