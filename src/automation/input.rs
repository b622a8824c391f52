//! Keyboard input simulation for navigating the Hall of Fame list.
//!
//! The game moves the selection one entry per arrow key press. Key events are
//! sent with SendInput, which goes through the same input path as hardware
//! keys, so the game window must have focus.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::automation::state::Position;

/// Navigation direction through the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Next entry (Down arrow): position increases
    Advance,
    /// Previous entry (Up arrow): position decreases
    Retreat,
}

impl Direction {
    /// Position change caused by one press.
    pub fn delta(self) -> Position {
        match self {
            Direction::Advance => 1,
            Direction::Retreat => -1,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Advance => write!(f, "down"),
            Direction::Retreat => write!(f, "up"),
        }
    }
}

/// Issues navigation key presses.
///
/// `press` returns once the key event was dispatched, not once the game
/// reacted to it.
pub trait InputDriver {
    fn press(&mut self, direction: Direction) -> Result<()>;
}

#[cfg(windows)]
pub use platform::KeyboardInput;

#[cfg(windows)]
mod platform {
    use anyhow::{anyhow, Result};

    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
        VIRTUAL_KEY, VK_DOWN, VK_UP,
    };

    use super::{Direction, InputDriver};

    /// Sends arrow key presses to the foreground window.
    #[derive(Debug, Default)]
    pub struct KeyboardInput;

    impl KeyboardInput {
        pub fn new() -> Self {
            Self
        }
    }

    fn key_event(vk: VIRTUAL_KEY, flags: KEYBD_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: vk,
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        }
    }

    impl InputDriver for KeyboardInput {
        fn press(&mut self, direction: Direction) -> Result<()> {
            let vk = match direction {
                Direction::Advance => VK_DOWN,
                Direction::Retreat => VK_UP,
            };
            let inputs = [
                key_event(vk, KEYBD_EVENT_FLAGS(0)),
                key_event(vk, KEYEVENTF_KEYUP),
            ];
            let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
            if sent as usize != inputs.len() {
                return Err(anyhow!(
                    "SendInput sent {} of {} key events ({})",
                    sent,
                    inputs.len(),
                    direction
                ));
            }
            Ok(())
        }
    }
}
