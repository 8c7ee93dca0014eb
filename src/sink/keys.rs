//! Media key injection using enigo

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tracing::debug;

use super::{CommandSink, SinkError};
use crate::chord::Command;

/// Media key codes per platform
mod media {
    use enigo::Key;

    /// XF86 keysyms
    #[cfg(all(unix, not(target_os = "macos")))]
    pub const PLAY: Key = Key::Other(0x1008_FF14);
    #[cfg(all(unix, not(target_os = "macos")))]
    pub const NEXT: Key = Key::Other(0x1008_FF17);
    #[cfg(all(unix, not(target_os = "macos")))]
    pub const PREVIOUS: Key = Key::Other(0x1008_FF16);

    /// Virtual-key codes
    #[cfg(target_os = "windows")]
    pub const PLAY: Key = Key::Other(0xB3);
    #[cfg(target_os = "windows")]
    pub const NEXT: Key = Key::Other(0xB0);
    #[cfg(target_os = "windows")]
    pub const PREVIOUS: Key = Key::Other(0xB1);

    #[cfg(target_os = "macos")]
    pub const PLAY: Key = Key::MediaPlayPause;
    #[cfg(target_os = "macos")]
    pub const NEXT: Key = Key::MediaNextTrack;
    #[cfg(target_os = "macos")]
    pub const PREVIOUS: Key = Key::MediaPrevTrack;
}

/// Keys pressed for a command, in order
///
/// Previous is pressed twice: by the third press of a chord the second one
/// has already skipped forward.
pub fn keys_for(command: Command) -> &'static [Key] {
    match command {
        Command::Play => &[media::PLAY],
        Command::Next => &[media::NEXT],
        Command::Previous => &[media::PREVIOUS, media::PREVIOUS],
    }
}

/// Sends media key presses to the focused window
pub struct KeySink {
    enigo: Enigo,
}

impl KeySink {
    /// Connect to the platform input system
    pub fn new() -> Result<Self, SinkError> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| SinkError::Init(e.to_string()))?;
        Ok(Self { enigo })
    }
}

impl CommandSink for KeySink {
    fn deliver(&mut self, command: Command) -> Result<(), SinkError> {
        for &key in keys_for(command) {
            debug!(%command, ?key, "sending media key");
            self.enigo
                .key(key, Direction::Click)
                .map_err(|e| SinkError::Key {
                    command,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}
