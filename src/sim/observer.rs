//! Module handles memory access observers,
//! which store which accesses occur at a given memory location.
//!
//! You would typically access an observer via the [`Simulator::observer`] field.
//! This [`AccessObserver`] can be used to read or update accesses via its [`get_mem_accesses`]
//! and [`update_mem_accesses`] methods.
//!
//! Only accesses made by executing instructions are recorded.
//! Instruction fetch, breakpoint checks and device transfers are not.
//!
//! [`Simulator::observer`]: crate::sim::Simulator::observer
//! [`get_mem_accesses`]: AccessObserver::get_mem_accesses
//! [`update_mem_accesses`]: AccessObserver::update_mem_accesses

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// The set of accesses which have occurred at this location.
///
/// ## Example
///
/// ```
/// # use bcd_ensemble::sim::observer::AccessSet;
///
/// let accesses = AccessSet::READ;
/// assert!(accesses.accessed());
/// assert!(accesses.read());
/// assert!(!accesses.written());
/// assert!(!accesses.wm_changed());
/// ```
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct AccessSet(u8);
impl AccessSet {
    /// Set with only the read flag enabled.
    pub const READ: Self = Self(1 << 0);
    /// Set with only the write flag enabled.
    pub const WRITTEN: Self = Self(1 << 1);
    /// Set with only the modify flag enabled.
    pub const MODIFIED: Self = Self(1 << 2);
    /// Set with only the word-mark-changed flag enabled.
    pub const WM_CHANGED: Self = Self(1 << 3);

    /// True if any access has occurred.
    pub fn accessed(&self) -> bool {
        self.0 != 0
    }

    /// True if a read has occurred.
    pub fn read(&self) -> bool {
        self.0 & Self::READ.0 != 0
    }
    /// True if a write has occurred (does not necessarily have to change data).
    pub fn written(&self) -> bool {
        self.0 & Self::WRITTEN.0 != 0
    }
    /// True if a write has occurred (the cell must change).
    pub fn modified(&self) -> bool {
        self.0 & Self::MODIFIED.0 != 0
    }
    /// True if a write set or cleared the word mark.
    pub fn wm_changed(&self) -> bool {
        self.0 & Self::WM_CHANGED.0 != 0
    }
}
impl std::ops::BitOr for AccessSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
impl std::ops::BitOrAssign for AccessSet {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}
impl std::fmt::Debug for AccessSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSet")
            .field("read", &self.read())
            .field("written", &self.written())
            .field("modified", &self.modified())
            .field("wm_changed", &self.wm_changed())
            .finish()
    }
}

/// A struct that tracks accesses in memory.
#[derive(Debug, Default)]
pub struct AccessObserver {
    mem: BTreeMap<u16, AccessSet>
}
impl AccessObserver {
    /// Creates a new access observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all accesses.
    pub fn clear(&mut self) {
        self.mem.clear();
    }

    /// Gets the access set for the given memory location.
    pub fn get_mem_accesses(&self, addr: u16) -> AccessSet {
        self.mem.get(&addr).copied().unwrap_or_default()
    }

    /// Adds new flags to the access set for the given memory location.
    pub fn update_mem_accesses(&mut self, addr: u16, set: AccessSet) {
        *self.mem.entry(addr).or_default() |= set;
    }

    /// The lowest and highest addresses written since the last clear.
    ///
    /// Fields are written right to left, so this is usually the span of the last field touched.
    pub fn written_span(&self) -> Option<RangeInclusive<u16>> {
        let mut written = self.mem.iter()
            .filter(|(_, set)| set.written())
            .map(|(&addr, _)| addr);

        let first = written.next()?;
        let last = written.last().unwrap_or(first);
        Some(first..=last)
    }

    /// Takes all memory accesses which have occurred since last clear,
    /// as well as clearing memory accesses.
    ///
    /// This iterator is sorted in address order.
    pub fn take_mem_accesses(&mut self) -> impl Iterator<Item=(u16, AccessSet)> {
        std::mem::take(&mut self.mem).into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates() {
        let mut obs = AccessObserver::new();
        obs.update_mem_accesses(600, AccessSet::READ);
        obs.update_mem_accesses(600, AccessSet::WRITTEN | AccessSet::WM_CHANGED);
        obs.update_mem_accesses(602, AccessSet::WRITTEN);
        obs.update_mem_accesses(700, AccessSet::READ);

        let set = obs.get_mem_accesses(600);
        assert!(set.read() && set.written() && set.wm_changed());
        assert!(!set.modified());
        assert!(!obs.get_mem_accesses(601).accessed());
        assert_eq!(obs.written_span(), Some(600..=602));

        let taken: Vec<_> = obs.take_mem_accesses().map(|(a, _)| a).collect();
        assert_eq!(taken, [600, 602, 700]);
        assert_eq!(obs.written_span(), None);
    }
}
