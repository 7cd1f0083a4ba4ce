//! Virtual interface registry.
//!
//! The scheduler keeps a small table of the interfaces sharing the radio. Each entry holds
//! a non-owning handle to its channel context and the interface's TBTT entry.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use super::types::{ChanIdx, SchedulerError, TbttEntry, VifIdx};

/// Transmit power value meaning "no constraint".
pub const UNDEFINED_TX_POWER: i8 = i8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VifKind {
    Station,
    AccessPoint,
}

/// Parameters given when an interface is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VifConfig {
    pub kind: VifKind,
    pub p2p: bool,
    pub beacon_interval: Duration,
    /// Station index of the peer AP (station interfaces).
    pub peer_ap: Option<u8>,
}

/// NOA window started for a P2P GO interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoaWindow {
    pub index: u8,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct VifEntry {
    pub index: VifIdx,
    pub kind: VifKind,
    pub p2p: bool,
    /// Associated (station) or started (access point).
    pub active: bool,
    pub beacon_interval: Duration,
    pub beacon_received: bool,
    /// For P2P clients, whether the GO is currently present.
    pub go_present: bool,
    pub noa: Option<NoaWindow>,
    pub chan: Option<ChanIdx>,
    pub tbtt: TbttEntry,
    pub tx_power: i8,
    pub user_tx_power: i8,
    pub peer_ap: Option<u8>,
}

impl VifEntry {
    fn new(index: VifIdx, config: &VifConfig) -> Self {
        Self {
            index,
            kind: config.kind,
            p2p: config.p2p,
            active: false,
            beacon_interval: config.beacon_interval,
            beacon_received: false,
            go_present: true,
            noa: None,
            chan: None,
            tbtt: TbttEntry::default(),
            tx_power: UNDEFINED_TX_POWER,
            user_tx_power: UNDEFINED_TX_POWER,
            peer_ap: config.peer_ap,
        }
    }

    pub fn is_p2p_go(&self) -> bool {
        self.p2p && self.kind == VifKind::AccessPoint
    }
}

#[derive(Debug)]
pub struct VifTable {
    entries: Vec<Option<VifEntry>>,
}

impl VifTable {
    pub fn new(capacity: u8) -> Self {
        Self {
            entries: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn register(&mut self, config: &VifConfig) -> Result<VifIdx, SchedulerError> {
        if config.beacon_interval.as_micros() == 0 {
            return Err(SchedulerError::InvalidBeaconInterval);
        }
        let slot = self.entries.iter().position(Option::is_none).ok_or(SchedulerError::VifTableFull)?;
        let index = VifIdx(slot as u8);
        self.entries[slot] = Some(VifEntry::new(index, config));
        Ok(index)
    }

    pub fn remove(&mut self, vif: VifIdx) -> Result<VifEntry, SchedulerError> {
        let entry = self.get(vif).ok_or(SchedulerError::UnknownVif(vif))?;
        if entry.chan.is_some() {
            return Err(SchedulerError::VifStillLinked(vif));
        }
        self.entries[vif.0 as usize].take().ok_or(SchedulerError::UnknownVif(vif))
    }

    pub fn get(&self, vif: VifIdx) -> Option<&VifEntry> {
        self.entries.get(vif.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, vif: VifIdx) -> Option<&mut VifEntry> {
        self.entries.get_mut(vif.0 as usize).and_then(Option::as_mut)
    }

    /// Registered interfaces in index order.
    pub fn iter(&self) -> impl Iterator<Item = &VifEntry> {
        self.entries.iter().flatten()
    }

    /// Interfaces linked to `chan`.
    pub fn linked_to(&self, chan: ChanIdx) -> impl Iterator<Item = &VifEntry> {
        self.iter().filter(move |vif| vif.chan == Some(chan))
    }

    pub fn p2p_count(&self) -> usize {
        self.iter().filter(|vif| vif.p2p).count()
    }
}
