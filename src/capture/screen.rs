//! Screen region capture using GDI.
//!
//! The Hall of Fame panel is read straight off the desktop, so a plain
//! `BitBlt` from the screen DC is enough: no window handle is needed.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};

use super::{CaptureSource, ScreenRect};

/// Captures rectangles of the primary desktop.
#[derive(Debug, Default)]
pub struct ScreenCapture;

impl ScreenCapture {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureSource for ScreenCapture {
    fn grab(&mut self, rect: &ScreenRect) -> Result<RgbImage> {
        capture_screen_rect(rect)
    }
}

/// Copies `rect` from the screen into an RGB image.
///
/// The bitmap is requested top-down (negative height) as 32-bit BGRA and
/// converted to RGB, dropping the unused alpha byte.
pub fn capture_screen_rect(rect: &ScreenRect) -> Result<RgbImage> {
    let width = rect.width();
    let height = rect.height();
    if width <= 0 || height <= 0 {
        return Err(anyhow!("Invalid capture rectangle {}", rect));
    }

    let mut bgra = vec![0u8; width as usize * height as usize * 4];

    unsafe {
        let screen_dc = GetDC(HWND::default());
        if screen_dc.is_invalid() {
            return Err(anyhow!("GetDC failed for the screen"));
        }
        let mem_dc = CreateCompatibleDC(screen_dc);
        let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
        let previous = SelectObject(mem_dc, bitmap);

        let blit = BitBlt(
            mem_dc, 0, 0, width, height, screen_dc, rect.left, rect.top, SRCCOPY,
        );

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let lines = GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            Some(bgra.as_mut_ptr() as *mut _),
            &mut info,
            DIB_RGB_COLORS,
        );

        let _ = SelectObject(mem_dc, previous);
        let _ = DeleteObject(bitmap);
        let _ = DeleteDC(mem_dc);
        let _ = ReleaseDC(HWND::default(), screen_dc);

        blit.map_err(|e| anyhow!("BitBlt failed for {}: {}", rect, e))?;
        if lines != height {
            return Err(anyhow!(
                "GetDIBits copied {} of {} lines for {}",
                lines,
                height,
                rect
            ));
        }
    }

    let mut img = RgbImage::new(width as u32, height as u32);
    for (pixel, chunk) in img.pixels_mut().zip(bgra.chunks_exact(4)) {
        // BGRA -> RGB
        *pixel = Rgb([chunk[2], chunk[1], chunk[0]]);
    }

    Ok(img)
}
