//! Chord module
//!
//! Maps groups of pulses to media commands:
//! - 1 pulse: Play
//! - 2 pulses within the debounce window: Play, then Next
//! - 3 pulses within the debounce window: Play, Next, then Previous

mod aggregator;
mod command;

pub use aggregator::ChordAggregator;
pub use command::Command;
