use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Dwm::{DwmSetWindowAttribute, DWMWINDOWATTRIBUTE};
use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetCursorPos, GetWindowLongPtrW, GetWindowRect, GetWindowTextW, IsIconic,
    IsWindowVisible, SetWindowLongPtrW, SetWindowPos, GWL_EXSTYLE, SWP_FRAMECHANGED,
    SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW,
};

use crate::elements::desktop::DesktopWindow;
use crate::elements::Bounds;

const VK_LBUTTON: i32 = 0x01;
const VK_ESCAPE: i32 = 0x1B;
const VK_F12: i32 = 0x7B;

/// Extract the Win32 HWND from a winit window.
pub fn get_hwnd(window: &winit::window::Window) -> Option<HWND> {
    let handle = window.window_handle().ok()?;
    match handle.as_raw() {
        RawWindowHandle::Win32(h) => Some(HWND(h.hwnd.get() as *mut core::ffi::c_void)),
        _ => None,
    }
}

fn set_dwm_u32(hwnd: HWND, attribute: i32, value: u32) {
    unsafe {
        let _ = DwmSetWindowAttribute(
            hwnd,
            DWMWINDOWATTRIBUTE(attribute),
            &value as *const u32 as *const core::ffi::c_void,
            4,
        );
    }
}

/// Apply overlay window styles: no activation, no taskbar entry, no DWM frame.
pub unsafe fn make_overlay(hwnd: HWND) {
    let style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE);

    // Drop WS_EX_LAYERED (GDI backing surface) and add WS_EX_NOREDIRECTIONBITMAP:
    // all pixels come from the DirectComposition visual wgpu creates.
    const WS_EX_LAYERED: isize = 0x00080000;
    const WS_EX_NOREDIRECTIONBITMAP: isize = 0x00200000;

    let new_style = (style & !WS_EX_LAYERED)
        | WS_EX_NOACTIVATE.0 as isize
        | WS_EX_TOOLWINDOW.0 as isize
        | WS_EX_NOREDIRECTIONBITMAP;
    SetWindowLongPtrW(hwnd, GWL_EXSTYLE, new_style);
    log::debug!("Window ex-style 0x{:08X} -> 0x{:08X}", style, new_style);

    // Force DWM to recalculate the frame with the new styles.
    let _ = SetWindowPos(
        hwnd,
        HWND::default(),
        0,
        0,
        0,
        0,
        SWP_FRAMECHANGED | SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
    );

    // DWMWA_NCRENDERING_POLICY = DWMNCRP_DISABLED
    set_dwm_u32(hwnd, 2, 2);
    // DWMWA_WINDOW_CORNER_PREFERENCE = DWMWCP_DONOTROUND
    set_dwm_u32(hwnd, 33, 1);
    // DWMWA_BORDER_COLOR = DWMWA_COLOR_NONE
    set_dwm_u32(hwnd, 34, 0xFFFF_FFFE);
    // DWMWA_SYSTEMBACKDROP_TYPE = DWMSBT_NONE
    set_dwm_u32(hwnd, 38, 1);
}

/// Turn the window into a transparent, click-through, always-on-top overlay.
pub fn setup_overlay(window: &winit::window::Window) {
    set_click_through(window, true);

    match get_hwnd(window) {
        Some(hwnd) => unsafe { make_overlay(hwnd) },
        None => log::warn!("No Win32 handle; overlay styles not applied"),
    }

    log::info!("Win32 overlay setup complete (DirectComposition + click-through + toolwindow)");
}

/// Click-through while the panel is hidden; interactive while it is shown.
pub fn set_click_through(window: &winit::window::Window, click_through: bool) {
    if let Err(e) = window.set_cursor_hittest(!click_through) {
        log::warn!("Failed to set cursor hittest: {e}");
    }
}

/// Global cursor position in screen pixels.
pub fn get_mouse_pos() -> (f32, f32) {
    let mut point = POINT::default();
    unsafe {
        let _ = GetCursorPos(&mut point);
    }
    (point.x as f32, point.y as f32)
}

/// ESC held (works regardless of focus; the overlay never has focus).
pub fn is_escape_pressed() -> bool {
    unsafe { GetAsyncKeyState(VK_ESCAPE) & (0x8000u16 as i16) != 0 }
}

/// F12 pressed since the last call (transition bit, not held state).
pub fn is_f12_pressed() -> bool {
    unsafe { GetAsyncKeyState(VK_F12) & 1 != 0 }
}

/// Left button down, or clicked and released since the last poll.
pub fn is_left_button_down() -> bool {
    let state = unsafe { GetAsyncKeyState(VK_LBUTTON) };
    (state & (0x8000u16 as i16) != 0) || (state & 1 != 0)
}

// ---------------------------------------------------------------------------
// Window enumeration
// ---------------------------------------------------------------------------

/// Visible, non-tool, non-minimized top-level windows in z-order
/// (topmost first), excluding our own overlay.
/// Call this periodically, NOT every frame.
pub fn enumerate_windows(own_hwnd: Option<HWND>) -> Vec<DesktopWindow> {
    struct EnumState {
        own_hwnd: Option<HWND>,
        results: Vec<DesktopWindow>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let state = &mut *(lparam.0 as *mut EnumState);

        if Some(hwnd) == state.own_hwnd {
            return TRUE;
        }
        if !IsWindowVisible(hwnd).as_bool() || IsIconic(hwnd).as_bool() {
            return TRUE;
        }

        // Tooltips, floating toolbars, other overlays.
        let ex_style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE);
        if (ex_style as u32) & WS_EX_TOOLWINDOW.0 != 0 {
            return TRUE;
        }

        let mut rect = RECT::default();
        if GetWindowRect(hwnd, &mut rect).is_err() {
            return TRUE;
        }
        let w = rect.right - rect.left;
        let h = rect.bottom - rect.top;
        if w <= 0 || h <= 0 {
            return TRUE;
        }

        let mut buf = [0u16; 256];
        let len = GetWindowTextW(hwnd, &mut buf);
        let title = if len > 0 {
            String::from_utf16_lossy(&buf[..len as usize])
        } else {
            String::new()
        };

        state.results.push(DesktopWindow {
            title,
            bounds: Bounds::new(rect.left as f32, rect.top as f32, w as f32, h as f32),
        });

        TRUE
    }

    let mut state = EnumState {
        own_hwnd,
        results: Vec::with_capacity(64),
    };

    unsafe {
        let _ = EnumWindows(
            Some(enum_callback),
            LPARAM(&mut state as *mut EnumState as isize),
        );
    }

    state.results
}
