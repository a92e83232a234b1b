//! Timer tick: PIT channel 0 in rate mode, counted by the IRQ 0 handler.

use core::sync::atomic::{AtomicU64, Ordering};
use x86_64::instructions::port::Port;

use crate::consts::{PIT_CH0, PIT_CMD, PIT_FREQ, TICK_HZ};

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Called from the timer interrupt handler.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

pub(crate) fn init_pit() {
    let divisor = (PIT_FREQ / TICK_HZ) as u16;

    let mut cmd = Port::<u8>::new(PIT_CMD);
    let mut ch0 = Port::<u8>::new(PIT_CH0);

    unsafe {
        // Channel 0 | lobyte/hibyte | mode 3 (square wave) | binary
        cmd.write(0b0011_0110);
        ch0.write((divisor & 0xFF) as u8);
        ch0.write((divisor >> 8) as u8);
    }
}
