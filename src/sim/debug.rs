//! Utilities to debug simulation.
//!
//! The key type here is [`Breakpoint`], which can be appended to the [`Simulator`]'s
//! breakpoint field to cause the simulator to break.
//!
//! The simulator also keeps a short [`PcHistory`] of the branches it has taken.
use std::collections::VecDeque;
use std::fmt::Write;

use super::bcd;
use super::Simulator;

/// Common breakpoints.
#[derive(PartialEq, Eq, Hash)]
pub enum Breakpoint {
    /// Break when the instruction address is equal to the given value.
    Address(u16),

    /// Break when the provided memory cell holds a given value.
    ///
    /// The value compared is the full cell, word mark included.
    Mem {
        /// Address to check.
        addr: u16,
        /// Predicate to break against.
        value: Comparator
    },

    /// Break when the given indicator is on.
    Indicator(u8),
}

impl Breakpoint where Breakpoint: Send + Sync { /* assert Breakpoint is send/sync */ }

impl Breakpoint {
    /// Checks if a break should occur.
    pub fn check(&self, sim: &Simulator) -> bool {
        match self {
            Breakpoint::Address(expected) => expected == &sim.is,
            Breakpoint::Mem { addr, value: cmp } => sim.mem.get(*addr).is_some_and(|c| cmp.check(c.get())),
            // get, not test: checking must not reset the latch
            Breakpoint::Indicator(ind) => sim.ind.get(*ind),
        }
    }

    fn fmt_bp(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Address(expected) => write!(f, "IS == {expected}"),
            Self::Mem { addr, value } => {
                write!(f, "mem[{addr}] ")?;
                value.fmt_cmp(f)
            },
            Self::Indicator(ind) => write!(f, "indicator {:?}", bcd::bcd_to_ascii(*ind)),
        }
    }
}
impl std::fmt::Debug for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Breakpoint(")?;
        self.fmt_bp(f)?;
        f.write_char(')')
    }
}

/// Predicate checking whether the current value is equal to the value.
#[derive(PartialEq, Eq, Hash, Debug)]
pub enum Comparator {
    /// Never breaks.
    Never,
    /// Break if the desired value is less than the provided value.
    Lt(u8),
    /// Break if the desired value is equal to the provided value.
    Eq(u8),
    /// Break if the desired value is less than or equal to the provided value.
    Le(u8),
    /// Break if the desired value is greater than the provided value.
    Gt(u8),
    /// Break if the desired value is not equal to the provided value.
    Ne(u8),
    /// Break if the desired value is greater than or equal to the provided value.
    Ge(u8),
    /// Always breaks.
    Always
}
impl Comparator {
    /// Checks if the operand passes the comparator.
    pub fn check(&self, operand: u8) -> bool {
        match *self {
            Comparator::Never  => false,
            Comparator::Lt(r)  => operand < r,
            Comparator::Eq(r)  => operand == r,
            Comparator::Le(r)  => operand <= r,
            Comparator::Gt(r)  => operand > r,
            Comparator::Ne(r)  => operand != r,
            Comparator::Ge(r)  => operand >= r,
            Comparator::Always => true,
        }
    }

    fn fmt_cmp(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparator::Never  => f.write_str("never"),
            Comparator::Lt(r)  => write!(f, "< {r:03o}"),
            Comparator::Eq(r)  => write!(f, "== {r:03o}"),
            Comparator::Le(r)  => write!(f, "<= {r:03o}"),
            Comparator::Gt(r)  => write!(f, "> {r:03o}"),
            Comparator::Ne(r)  => write!(f, "!= {r:03o}"),
            Comparator::Ge(r)  => write!(f, ">= {r:03o}"),
            Comparator::Always => f.write_str("always"),
        }
    }
}

/// The addresses of the most recent branches taken, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcHistory(VecDeque<u16>);
impl PcHistory {
    /// How many branches are remembered.
    pub const CAPACITY: usize = 64;

    /// Creates an empty history.
    pub fn new() -> Self {
        Self(VecDeque::with_capacity(Self::CAPACITY))
    }

    /// Records the address of a branch instruction, forgetting the oldest if full.
    pub fn push(&mut self, addr: u16) {
        if self.0.len() == Self::CAPACITY {
            self.0.pop_front();
        }
        self.0.push_back(addr);
    }

    /// The most recent branch, if any.
    pub fn last(&self) -> Option<u16> {
        self.0.back().copied()
    }

    /// The number of branches remembered.
    pub fn len(&self) -> usize {
        self.0.len()
    }
    /// Whether no branch has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the remembered branches, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }
}
