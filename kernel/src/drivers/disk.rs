//! Block device over the primary ATA channel (PIO, LBA28).
//!
//! The drive is polled, never interrupt driven; the filesystem issues one
//! synchronous request at a time. Status waits carry a generous poll budget
//! so a dead or absent drive surfaces as a failed request instead of
//! wedging the shell. Failures are reported as-is; retrying is the caller's
//! decision and the filesystem layer never does.

use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;
use x86_64::instructions::port::{Port, PortReadOnly, PortWriteOnly};

pub const SECTOR_SIZE: usize = 512;

// Primary channel: command block at 0x1F0, control block at 0x3F6.
const COMMAND_BLOCK: u16 = 0x1F0;
const CONTROL_BLOCK: u16 = 0x3F6;

// Register offsets within the command block
const REG_DATA: u16 = 0;
const REG_COUNT: u16 = 2;
const REG_LBA0: u16 = 3;
const REG_LBA8: u16 = 4;
const REG_LBA16: u16 = 5;
const REG_DEVICE: u16 = 6;
const REG_COMMAND: u16 = 7; // reads back as the status register

mod status {
    pub const ERR: u8 = 1 << 0;
    pub const DRQ: u8 = 1 << 3;
    pub const BSY: u8 = 1 << 7;
}

mod cmd {
    pub const READ: u8 = 0x20;
    pub const WRITE: u8 = 0x30;
    pub const FLUSH: u8 = 0xE7;
    pub const IDENTIFY: u8 = 0xEC;
}

/// Status polls before a request is declared stuck. Orders of magnitude
/// beyond any real seek, still finite.
const POLL_BUDGET: u32 = 50_000_000;

struct AtaChannel {
    data: Port<u16>,
    count: PortWriteOnly<u8>,
    lba0: PortWriteOnly<u8>,
    lba8: PortWriteOnly<u8>,
    lba16: PortWriteOnly<u8>,
    device: PortWriteOnly<u8>,
    command: PortWriteOnly<u8>,
    status: PortReadOnly<u8>,
    alt_status: PortReadOnly<u8>,
}

static CHANNEL: Mutex<AtaChannel> = Mutex::new(AtaChannel::new());

/// Sector capacity of the identified drive; zero while none is present.
static SECTORS: AtomicU64 = AtomicU64::new(0);

impl AtaChannel {
    const fn new() -> Self {
        AtaChannel {
            data: Port::new(COMMAND_BLOCK + REG_DATA),
            count: PortWriteOnly::new(COMMAND_BLOCK + REG_COUNT),
            lba0: PortWriteOnly::new(COMMAND_BLOCK + REG_LBA0),
            lba8: PortWriteOnly::new(COMMAND_BLOCK + REG_LBA8),
            lba16: PortWriteOnly::new(COMMAND_BLOCK + REG_LBA16),
            device: PortWriteOnly::new(COMMAND_BLOCK + REG_DEVICE),
            command: PortWriteOnly::new(COMMAND_BLOCK + REG_COMMAND),
            status: PortReadOnly::new(COMMAND_BLOCK + REG_COMMAND),
            alt_status: PortReadOnly::new(CONTROL_BLOCK),
        }
    }

    /// The spec'd ~400 ns settle after a device-select: four reads of the
    /// alternate status register, which never clears interrupt state.
    fn settle(&mut self) {
        for _ in 0..4 {
            unsafe {
                let _ = self.alt_status.read();
            }
        }
    }

    /// Poll until BSY drops and every bit of `wanted` is up. ERR or an
    /// exhausted budget fails the wait.
    fn await_status(&mut self, wanted: u8) -> bool {
        for _ in 0..POLL_BUDGET {
            let s = unsafe { self.status.read() };
            if s & status::BSY == 0 {
                if s & status::ERR != 0 {
                    return false;
                }
                if s & wanted == wanted {
                    return true;
                }
            }
            core::hint::spin_loop();
        }
        false
    }

    /// Select the master drive, program an LBA28 request, fire `command`.
    fn submit(&mut self, command: u8, lba: u64, count: u8) -> bool {
        unsafe {
            // LBA mode, master, address bits 24..28 in the device register
            self.device.write(0xE0 | ((lba >> 24) as u8 & 0x0F));
        }
        self.settle();
        if !self.await_status(0) {
            return false;
        }
        unsafe {
            self.count.write(count);
            self.lba0.write(lba as u8);
            self.lba8.write((lba >> 8) as u8);
            self.lba16.write((lba >> 16) as u8);
            self.command.write(command);
        }
        true
    }

    fn transfer_in(&mut self, out: &mut [u8]) {
        for pair in out.chunks_exact_mut(2) {
            let word = unsafe { self.data.read() };
            pair.copy_from_slice(&word.to_le_bytes());
        }
    }

    fn transfer_out(&mut self, src: &[u8]) {
        for pair in src.chunks_exact(2) {
            let word = u16::from_le_bytes([pair[0], pair[1]]);
            unsafe { self.data.write(word) };
        }
    }

    /// IDENTIFY the primary master. Returns its capacity in sectors, or
    /// `None` when the bus floats or the device rejects the command.
    fn identify(&mut self) -> Option<u64> {
        unsafe {
            self.device.write(0xA0);
        }
        self.settle();
        unsafe {
            self.count.write(0);
            self.lba0.write(0);
            self.lba8.write(0);
            self.lba16.write(0);
            self.command.write(cmd::IDENTIFY);
        }
        self.settle();
        if unsafe { self.status.read() } == 0 {
            return None;
        }
        if !self.await_status(status::DRQ) {
            return None;
        }

        let mut id = [0u8; SECTOR_SIZE];
        self.transfer_in(&mut id);
        let word = |i: usize| u16::from_le_bytes([id[2 * i], id[2 * i + 1]]) as u64;

        // 48-bit capacity in words 100..104 when supported, else the
        // 28-bit count in words 60..62.
        let lba48 = word(100) | word(101) << 16 | word(102) << 32 | word(103) << 48;
        let lba28 = word(60) | word(61) << 16;
        Some(if lba48 != 0 { lba48 } else { lba28 })
    }
}

pub fn init() {
    match CHANNEL.lock().identify() {
        Some(total) => {
            SECTORS.store(total, Ordering::Release);
            log::info!(
                "ata: primary master ready, {} sectors ({} MB)",
                total,
                total * SECTOR_SIZE as u64 / (1024 * 1024)
            );
        }
        None => log::warn!("ata: no usable drive on the primary channel"),
    }
}

pub fn present() -> bool {
    SECTORS.load(Ordering::Acquire) != 0
}

pub fn sector_count() -> u64 {
    SECTORS.load(Ordering::Acquire)
}

/// Read `count` sectors starting at `lba` into `buf`. Returns `true` on
/// success.
pub fn read_sectors(lba: u64, count: u32, buf: &mut [u8]) -> bool {
    let bytes = count as usize * SECTOR_SIZE;
    if !present() || count == 0 || count > 255 || buf.len() < bytes {
        return false;
    }

    let mut channel = CHANNEL.lock();
    if !channel.submit(cmd::READ, lba, count as u8) {
        return false;
    }
    for sector in buf[..bytes].chunks_exact_mut(SECTOR_SIZE) {
        if !channel.await_status(status::DRQ) {
            return false;
        }
        channel.transfer_in(sector);
    }
    true
}

/// Write `count` sectors starting at `lba` from `buf`, flushing the drive's
/// write cache before reporting success.
pub fn write_sectors(lba: u64, count: u32, buf: &[u8]) -> bool {
    let bytes = count as usize * SECTOR_SIZE;
    if !present() || count == 0 || count > 255 || buf.len() < bytes {
        return false;
    }

    let mut channel = CHANNEL.lock();
    if !channel.submit(cmd::WRITE, lba, count as u8) {
        return false;
    }
    for sector in buf[..bytes].chunks_exact(SECTOR_SIZE) {
        if !channel.await_status(status::DRQ) {
            return false;
        }
        channel.transfer_out(sector);
    }

    unsafe { channel.command.write(cmd::FLUSH) };
    channel.await_status(0)
}
