//! Error interface for this crate.
//!
//! This module re-exports every error type in the crate
//! and defines [`Error`], which adds source spans and help messages to them.

use std::borrow::Cow;
use std::ops::Range;

pub use crate::load::lex::LexErr;
pub use crate::load::{LoadErr, LoadErrKind};
pub use crate::sim::StopReason;

/// A byte range in the source text an error refers to.
pub type ErrSpan = Range<usize>;

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The range in the source text that caused this error.
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A message to help the user resolve the error.
    fn help(&self) -> Option<Cow<str>>;
}

impl Error for StopReason {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            StopReason::IllegalOpcode   => Some("check the opcode and the installed CPU options".into()),
            StopReason::NoWordMark      => Some("every instruction begins with a word-marked opcode".into()),
            StopReason::InvalidA | StopReason::InvalidB => Some("an address digit is blank or the address is beyond memory".into()),
            StopReason::InvalidLength   => Some("an instruction ends at the next word mark; check the word mark after this one".into()),
            StopReason::InvalidBranch   => Some("the branch address is beyond the installed memory".into()),
            StopReason::AddressWrap     => Some("a field ran past the end of memory; check its word mark".into()),
            StopReason::NotAttached     => Some("attach a device to the simulator's device handler".into()),
            StopReason::NoCards         => Some("add cards to the reader's hopper".into()),
            StopReason::IoCheck         => Some("a device set its error indicator; turn off strict I/O to continue past it".into()),
            _ => None,
        }
    }
}
