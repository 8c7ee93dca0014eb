//! Pulse classifier
//!
//! Turns the raw 8-bit sample stream into pulse events:
//! - Idle: accumulating a low dwell long enough to arm
//! - HighHold: armed, waiting for the short high segment
//! - Cooldown: waiting for the signal to return low

mod machine;
mod thresholds;

pub use machine::{ClassifierState, PulseClassifier, PulseDetected};
pub use thresholds::{Thresholds, SAMPLE_RATE};
