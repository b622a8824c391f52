//! Operator abort: a polled "stop now" query.

/// Answers whether the operator asked the scan to stop.
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

#[cfg(test)]
pub use flag::AbortFlag;


#[cfg(windows)]
pub use platform::ExitKeys;

#[cfg(windows)]
mod platform {
    use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_ESCAPE};

    use super::CancelSignal;

    /// Keys that stop the scan while held: q, z, Esc.
    const EXIT_KEYS: [i32; 3] = [0x51, 0x5A, VK_ESCAPE.0 as i32];

    /// Polls the keyboard for a held exit key.
    #[derive(Debug, Default)]
    pub struct ExitKeys;

    impl CancelSignal for ExitKeys {
        fn is_cancelled(&self) -> bool {
            EXIT_KEYS.iter().any(|&vk| {
                let state = unsafe { GetAsyncKeyState(vk) };
                // High bit: key is currently down
                (state as u16 & 0x8000) != 0
            })
        }
    }
}
