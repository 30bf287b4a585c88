//! SlotMap: fixed table from hash slot to the addresses serving it.

use std::sync::Arc;

use crate::hash::HASH_SLOTS;

/// One contiguous slot range from a topology reply, bounds inclusive.
///
/// Addresses are ordered master first, replicas after.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub addrs: Vec<String>,
}

impl SlotRange {
    pub fn new<S: Into<String>>(start: u16, end: u16, addrs: impl IntoIterator<Item = S>) -> Self {
        Self {
            start,
            end,
            addrs: addrs.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether both bounds lie in the slot space and are ordered.
    pub fn is_valid(&self) -> bool {
        self.start <= self.end && usize::from(self.end) < HASH_SLOTS
    }
}

/// Every slot's address list. All slots of one range share one allocation.
#[derive(Clone)]
pub(crate) struct SlotMap {
    slots: Vec<Option<Arc<[String]>>>,
}

impl std::fmt::Debug for SlotMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let assigned = self.slots.iter().filter(|slot| slot.is_some()).count();
        f.debug_struct("SlotMap")
            .field("assigned", &assigned)
            .finish_non_exhaustive()
    }
}

impl SlotMap {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![None; HASH_SLOTS],
        }
    }

    /// Assign a validated range. Ranges with no addresses leave their slots
    /// unassigned.
    pub(crate) fn assign(&mut self, range: &SlotRange) {
        let addrs: Option<Arc<[String]>> =
            (!range.addrs.is_empty()).then(|| Arc::from(range.addrs.as_slice()));
        let (start, end) = (usize::from(range.start), usize::from(range.end));
        for slot in &mut self.slots[start..=end] {
            slot.clone_from(&addrs);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.fill(None);
    }

    /// Addresses serving `slot`, master first. Empty when unassigned.
    pub(crate) fn addrs(&self, slot: u16) -> &[String] {
        self.slots
            .get(usize::from(slot))
            .and_then(Option::as_deref)
            .unwrap_or(&[])
    }

    pub(crate) fn master(&self, slot: u16) -> Option<&str> {
        self.addrs(slot).first().map(String::as_str)
    }
}
