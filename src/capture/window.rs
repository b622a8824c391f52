//! Window discovery and capture geometry for the game's Hall of Fame view.

use anyhow::Result;

use super::{CropBox, ScreenRect};

/// Used when the game window cannot be found or reports a bogus size.
pub const FALLBACK_RECT: ScreenRect = ScreenRect::new(0, 0, 1928, 1048);

/// Windows narrower or shorter than this are minimized or misconfigured.
const MIN_WINDOW_EDGE: i32 = 10;

/// Resolves the screen rectangle to capture.
///
/// A configured window size wins over discovery. Otherwise `locate` is asked
/// for the game window; if that fails or the result is too small the fixed
/// fallback rectangle is used.
pub fn resolve_capture_rect(
    window_size: Option<[u32; 2]>,
    locate: impl FnOnce() -> Result<ScreenRect>,
) -> ScreenRect {
    let rect = match window_size {
        Some([w, h]) => {
            crate::log(&format!("Using configured window size {}x{}", w, h));
            ScreenRect::new(0, 0, w as i32, h as i32)
        }
        None => match locate() {
            Ok(rect) => rect,
            Err(e) => {
                crate::log(&format!("Warning: Game window not found ({})", e));
                FALLBACK_RECT
            }
        },
    };

    // Minimized windows report coordinates around -32000
    if rect.right < MIN_WINDOW_EDGE
        || rect.bottom < MIN_WINDOW_EDGE
        || rect.width() < MIN_WINDOW_EDGE
        || rect.height() < MIN_WINDOW_EDGE
    {
        crate::log("Warning: Game is minimized or window size is too small - using fallback");
        return FALLBACK_RECT;
    }

    rect
}

/// Computes the insets that isolate the player detail panel (right upper
/// part of the Hall of Fame screen) from a capture of `rect`.
///
/// Insets scale with the rectangle's width and height, not its absolute
/// right/bottom edges, so a window away from the screen origin crops the same.
pub fn crop_box_for(rect: &ScreenRect) -> CropBox {
    let w = rect.width().max(0) as f64;
    let h = rect.height().max(0) as f64;
    CropBox {
        left: (w / 1.68) as u32,
        top: (h / 29.94) as u32,
        right: (w / 38.56) as u32,
        bottom: (h / 2.49) as u32,
    }
}

#[cfg(windows)]
pub use platform::find_game_window;

#[cfg(windows)]
mod platform {
    use anyhow::{anyhow, Result};
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;

    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowRect, GetWindowTextLengthW, GetWindowTextW, IsWindowVisible,
        SetForegroundWindow,
    };

    use crate::capture::ScreenRect;

    /// Finds the first visible window whose title contains `title`, brings it
    /// to the foreground and returns its rectangle.
    pub fn find_game_window(title: &str) -> Result<ScreenRect> {
        struct EnumData {
            needle: String,
            hwnd: Option<HWND>,
            title: Option<String>,
        }

        unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
            unsafe {
                let data = &mut *(lparam.0 as *mut EnumData);

                if !IsWindowVisible(hwnd).as_bool() {
                    return TRUE;
                }

                let title_len = GetWindowTextLengthW(hwnd);
                if title_len <= 0 {
                    return TRUE;
                }
                let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
                GetWindowTextW(hwnd, &mut title_buf);
                let title = OsString::from_wide(&title_buf[..title_len as usize])
                    .to_string_lossy()
                    .to_string();

                if title.contains(&data.needle) {
                    data.hwnd = Some(hwnd);
                    data.title = Some(title);
                    return BOOL(0); // Stop enumeration
                }

                TRUE
            }
        }

        crate::log(&format!("Searching for \"{}\" window...", title));
        let mut data = EnumData {
            needle: title.to_string(),
            hwnd: None,
            title: None,
        };
        unsafe {
            // EnumWindows reports FALSE when the callback stops early
            let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
        }

        let hwnd = data
            .hwnd
            .ok_or_else(|| anyhow!("no visible window titled \"{}\"", title))?;
        if let Some(found) = &data.title {
            crate::log(&format!("Found window: \"{}\"", found));
        }

        unsafe {
            let _ = SetForegroundWindow(hwnd);
        }

        let mut rect = RECT::default();
        unsafe { GetWindowRect(hwnd, &mut rect)? };

        Ok(ScreenRect::new(rect.left, rect.top, rect.right, rect.bottom))
    }
}
