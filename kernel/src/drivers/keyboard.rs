//! PS/2 keyboard: set-1 scancode translation delivered as ASCII to the
//! shell's key callback.
//!
//! When the USB keyboard path is active this driver still drains the
//! controller's output port (the byte must be consumed) but takes no other
//! action.

use spin::Mutex;
use x86_64::instructions::port::Port;

const DATA_PORT: u16 = 0x60;

/// PS/2 Set 1 scancode-to-ASCII lookup table (unshifted)
static NORMAL: &[u8] = &[
    0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', b'\x08',
    b'\t', b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n',
    0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`',
    0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*',
    0, b' ',
];

/// PS/2 Set 1 scancode-to-ASCII lookup table (shifted)
static SHIFTED: &[u8] = &[
    0, 27, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', b'\x08',
    b'\t', b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n',
    0, b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~',
    0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*',
    0, b' ',
];

// Keyboard state
static SHIFT_PRESSED: Mutex<bool> = Mutex::new(false);
static CAPSLOCK_ON: Mutex<bool> = Mutex::new(false);
static EXTENDED: Mutex<bool> = Mutex::new(false);

fn scancode_to_ascii(code: u8, uppercase: bool) -> Option<u8> {
    let table = if uppercase { SHIFTED } else { NORMAL };
    if (code as usize) < table.len() {
        let c = table[code as usize];
        if c != 0 {
            return Some(c);
        }
    }
    None
}

/// Process a raw PS/2 scancode and deliver resulting ASCII to the shell.
pub fn handle_scancode(scancode: u8) {
    // E0 prefix for extended keys
    if scancode == 0xE0 {
        *EXTENDED.lock() = true;
        return;
    }

    let released = scancode & 0x80 != 0;
    let code = scancode & 0x7F;
    let pressed = !released;

    let mut extended = EXTENDED.lock();
    let is_extended = *extended;
    *extended = false;
    drop(extended);

    // Extended keys (arrows, home/end) have no line-editor meaning here
    if is_extended {
        return;
    }

    // Shift keys
    if code == 0x2A || code == 0x36 {
        *SHIFT_PRESSED.lock() = pressed;
        return;
    }

    // Caps lock (toggle on press only)
    if code == 0x3A && pressed {
        let mut caps = CAPSLOCK_ON.lock();
        *caps = !*caps;
        return;
    }

    if !pressed {
        return;
    }

    let shift = *SHIFT_PRESSED.lock();
    let caps = *CAPSLOCK_ON.lock();
    if let Some(ascii) = scancode_to_ascii(code, shift ^ caps) {
        crate::shell::on_key(ascii);
    }
}

/// Called from the keyboard interrupt handler.
pub fn on_interrupt() {
    let scancode: u8 = unsafe { Port::new(DATA_PORT).read() };
    if crate::usb::keyboard_active() {
        return;
    }
    handle_scancode(scancode);
}
