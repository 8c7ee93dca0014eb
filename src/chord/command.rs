//! Commands produced by chords

use serde::{Deserialize, Serialize};

/// A media command decoded from a chord of pulses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// First pulse of a chord
    Play,
    /// Second pulse inside the debounce window
    Next,
    /// Third pulse inside the debounce window
    Previous,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Play => write!(f, "PLAY"),
            Command::Next => write!(f, "NEXT"),
            Command::Previous => write!(f, "PREVIOUS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let json = serde_json::to_string(&Command::Previous).unwrap();
        assert_eq!(json, r#""previous""#);
    }
}
