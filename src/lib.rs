//! A simulator for the 1401-class decimal computer.
//!
//! The machine has character-addressed memory (4,000 to 16,000 characters), where each
//! character carries a word mark bit that delimits fields and instructions.
//! Instructions and operands are variable length.
//!
//! # Usage
//!
//! Programs are written as core images (see [`load`]) and run with the simulator:
//! ```
//! use bcd_ensemble::load::parse_image;
//! use bcd_ensemble::sim::{Simulator, StopReason};
//!
//! let image = parse_image(r#"
//!     .org 333
//!     "~A505510~.~}"
//!     .org 501 "~1234J"
//!     .org 506 "~0100?"
//!     .start 333
//! "#).unwrap();
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_image(&image).unwrap();
//! assert_eq!(sim.run(), StopReason::Halt);
//! // 1000 + -12341 = -11341
//! assert_eq!(sim.mem.text(506..511), "1134J");
//! ```
//!
//! If more granularity is needed for simulation, there are also step and breakpoint functions.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod load;
pub mod sim;
pub mod err;
