//! ClusterTopology: slot routing table shared by every command.
//!
//! # Refresh cycle
//!
//! ```text
//! MOVED reply / dead node / timer → force_reload()      (many producers)
//!   → next command: reload_if_due() == true             (one consumer)
//!     → caller runs topology discovery
//!       → rebuild(ranges)   reset + update, one write lock
//! ```
//!
//! Routing against a stale table in between is accepted: the next redirect
//! or failure triggers another reload.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::redirect::{Redirect, RedirectKind};
use crate::slot_map::{SlotMap, SlotRange};

// ── ReloadFlag ───────────────────────────────────────────────────────

/// Coalescing dirty bit: any number of `force` calls before a `take`
/// produce exactly one pending reload.
#[derive(Debug, Default)]
pub struct ReloadFlag(AtomicBool);

impl ReloadFlag {
    pub fn new(set: bool) -> Self {
        Self(AtomicBool::new(set))
    }

    pub fn force(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether a reload was pending.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

// ── AddressSet ───────────────────────────────────────────────────────

/// Sorted set of every known node address. Seeds are never dropped.
#[derive(Clone, Debug)]
struct AddressSet {
    seeds: BTreeSet<String>,
    addrs: BTreeSet<String>,
}

impl AddressSet {
    fn new(seeds: BTreeSet<String>) -> Self {
        Self {
            addrs: seeds.clone(),
            seeds,
        }
    }

    fn insert(&mut self, addr: &str) {
        if !self.addrs.contains(addr) {
            self.addrs.insert(addr.to_string());
        }
    }

    fn reset(&mut self) {
        self.addrs.clone_from(&self.seeds);
    }

    fn next(&self, seen: &HashSet<String>) -> Option<String> {
        self.addrs.iter().find(|addr| !seen.contains(*addr)).cloned()
    }
}

// ── ClusterTopology ──────────────────────────────────────────────────

#[derive(Debug)]
struct Tables {
    slots: SlotMap,
    addrs: AddressSet,
}

impl Tables {
    fn reset(&mut self) {
        self.slots.clear();
        self.addrs.reset();
    }

    fn update(&mut self, ranges: &[SlotRange]) -> usize {
        let mut applied = 0;
        for range in ranges {
            if !range.is_valid() {
                warn!(
                    start = range.start,
                    end = range.end,
                    "ignoring slot range outside the slot space"
                );
                continue;
            }
            self.slots.assign(range);
            for addr in &range.addrs {
                self.addrs.insert(addr);
            }
            applied += 1;
        }
        applied
    }
}

/// Slot → node routing table plus the set of retry candidates.
#[derive(Debug)]
pub struct ClusterTopology {
    tables: RwLock<Tables>,
    reload: ReloadFlag,
}

impl ClusterTopology {
    /// Create a topology that knows only its seed addresses. The reload flag
    /// starts set since no slot is assigned yet.
    pub fn new<S: Into<String>>(seeds: impl IntoIterator<Item = S>) -> Self {
        let seeds: BTreeSet<String> = seeds.into_iter().map(Into::into).collect();
        Self {
            tables: RwLock::new(Tables {
                slots: SlotMap::new(),
                addrs: AddressSet::new(seeds),
            }),
            reload: ReloadFlag::new(true),
        }
    }

    /// Assign every slot of each range and learn every address in it.
    ///
    /// Ranges are applied in order; a range outside the slot space is
    /// skipped with a warning.
    pub fn update(&self, ranges: &[SlotRange]) {
        let applied = self.tables.write().update(ranges);
        debug!(ranges = ranges.len(), applied, "updated slot table");
    }

    /// Unassign every slot and forget every non-seed address.
    pub fn reset(&self) {
        self.tables.write().reset();
    }

    /// Replace the whole table with `ranges`. Readers see either the old or
    /// the new table, never the seed-only state in between.
    pub fn rebuild(&self, ranges: &[SlotRange]) {
        let mut tables = self.tables.write();
        tables.reset();
        let applied = tables.update(ranges);
        let addrs = tables.addrs.addrs.len();
        drop(tables);
        info!(ranges = applied, addrs, "rebuilt cluster topology");
    }

    /// Master address for `slot`, or `None` if the slot is unassigned and
    /// the topology has to be refreshed before it can be routed.
    pub fn master_addr_by_slot(&self, slot: u16) -> Option<String> {
        self.tables.read().slots.master(slot).map(str::to_string)
    }

    /// Master address for the slot owning `key`.
    pub fn master_addr_by_key(&self, key: &[u8]) -> Option<String> {
        self.master_addr_by_slot(crate::hash::key_slot(key))
    }

    /// All addresses serving `slot`, master first.
    pub fn slot_addrs(&self, slot: u16) -> Vec<String> {
        self.tables.read().slots.addrs(slot).to_vec()
    }

    /// Known addresses in sorted order.
    pub fn addrs(&self) -> Vec<String> {
        self.tables.read().addrs.addrs.iter().cloned().collect()
    }

    /// The first known address, in sorted order, not in `seen`.
    ///
    /// Adding each returned address to `seen` walks every known address
    /// exactly once before `None` is returned.
    pub fn next(&self, seen: &HashSet<String>) -> Option<String> {
        self.tables.read().addrs.next(seen)
    }

    /// Flag the topology as stale.
    pub fn force_reload(&self) {
        self.reload.force();
    }

    pub fn needs_reload(&self) -> bool {
        self.reload.is_set()
    }

    /// Check and clear the reload flag. Returns `true` to exactly one caller
    /// per batch of `force_reload` calls.
    pub fn reload_if_due(&self) -> bool {
        self.reload.take()
    }

    /// React to a redirect reply: a MOVED slot has changed owner for good,
    /// so the table is flagged stale. ASK is a one-off and changes nothing.
    pub fn note_redirect(&self, redirect: &Redirect) {
        match redirect.kind {
            RedirectKind::Moved => {
                debug!(slot = redirect.slot, addr = %redirect.addr, "slot moved");
                self.force_reload();
            }
            RedirectKind::Ask => {}
        }
    }
}
