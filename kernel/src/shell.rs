//! Command prompt: a line editor fed by whichever keyboard path is active,
//! and the commands that drive the filesystem engine.

use alloc::vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use fat32::{format, suggest_sectors_per_cluster, BlockDev, Entry, FsError, Volume};

use crate::consts::MAX_COMMAND_LENGTH;
use crate::drivers::{disk, vga};
use crate::{pci, print, println};

// ─── Key input ─────────────────────────────────────────────────────────────────

const KEY_BUFFER_SIZE: usize = 64;

struct KeyBuffer {
    buffer: [u8; KEY_BUFFER_SIZE],
    head: usize,
    tail: usize,
    count: usize,
}

impl KeyBuffer {
    const fn new() -> Self {
        Self {
            buffer: [0; KEY_BUFFER_SIZE],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    fn push(&mut self, key: u8) {
        if self.count < KEY_BUFFER_SIZE {
            self.buffer[self.tail] = key;
            self.tail = (self.tail + 1) % KEY_BUFFER_SIZE;
            self.count += 1;
        }
        // Drop new keys while full; the line editor will catch up
    }

    fn pop(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        let key = self.buffer[self.head];
        self.head = (self.head + 1) % KEY_BUFFER_SIZE;
        self.count -= 1;
        Some(key)
    }
}

static KEY_BUFFER: Mutex<KeyBuffer> = Mutex::new(KeyBuffer::new());
static KEY_AVAILABLE: AtomicBool = AtomicBool::new(false);

/// The single key callback both keyboard paths deliver into. Runs in
/// interrupt context.
pub fn on_key(ascii: u8) {
    KEY_BUFFER.lock().push(ascii);
    KEY_AVAILABLE.store(true, Ordering::Release);
}

fn read_key() -> u8 {
    loop {
        let key = x86_64::instructions::interrupts::without_interrupts(|| {
            let mut buf = KEY_BUFFER.lock();
            let key = buf.pop();
            if buf.count == 0 {
                KEY_AVAILABLE.store(false, Ordering::Release);
            }
            key
        });
        if let Some(k) = key {
            return k;
        }
        x86_64::instructions::hlt();
    }
}

/// Blocking line editor with echo and backspace. Returns the line length.
fn read_line(buf: &mut [u8; MAX_COMMAND_LENGTH]) -> usize {
    let mut len = 0;
    loop {
        match read_key() {
            b'\n' => {
                print!("\n");
                return len;
            }
            0x08 => {
                if len > 0 {
                    len -= 1;
                    print!("\x08");
                }
            }
            key if (0x20..0x7F).contains(&key) => {
                if len < MAX_COMMAND_LENGTH - 1 {
                    buf[len] = key;
                    len += 1;
                    print!("{}", key as char);
                }
            }
            _ => {}
        }
    }
}

// ─── Filesystem state ──────────────────────────────────────────────────────────

/// Block device adapter over the ATA driver for the filesystem engine.
pub struct AtaDisk;

impl BlockDev for AtaDisk {
    fn read(&mut self, lba: u64, buf: &mut [u8; 512]) -> bool {
        disk::read_sectors(lba, 1, buf)
    }
    fn write(&mut self, lba: u64, buf: &[u8; 512]) -> bool {
        disk::write_sectors(lba, 1, buf)
    }
}

static VOLUME: Mutex<Option<Volume<AtaDisk>>> = Mutex::new(None);

fn with_volume(f: impl FnOnce(&mut Volume<AtaDisk>)) {
    match VOLUME.lock().as_mut() {
        Some(vol) => f(vol),
        None => println!("Filesystem not mounted. Use 'mount' first."),
    }
}

fn report(result: Result<(), FsError>, success: &str) {
    match result {
        Ok(()) => println!("{success}"),
        Err(e) => println!("Error: {e}."),
    }
}

// ─── REPL ──────────────────────────────────────────────────────────────────────

pub fn run() -> ! {
    println!();
    println!("Command prompt ready. Type 'help' for available commands.");
    println!();

    let mut line = [0u8; MAX_COMMAND_LENGTH];
    loop {
        print!("> ");
        let len = read_line(&mut line);
        let Ok(input) = core::str::from_utf8(&line[..len]) else {
            continue;
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let (cmd, args) = match input.find(' ') {
            Some(i) => (&input[..i], input[i + 1..].trim()),
            None => (input, ""),
        };

        match cmd {
            "help" => cmd_help(),
            "clear" => vga::clear_screen(),
            "mount" => cmd_mount(),
            "unmount" => cmd_unmount(),
            "formatfs" => cmd_formatfs(),
            "ls" => cmd_ls(),
            "cat" => cmd_cat(args),
            "rm" => cmd_rm(args),
            "mv" => cmd_mv(args),
            "cp" => cmd_cp(args),
            "write" => cmd_write(args),
            "chkdsk" => cmd_chkdsk(),
            "pciscan" => cmd_pciscan(),
            "dmadump" => cmd_dmadump(args),
            "ticks" => println!("{}", crate::time::ticks()),
            _ => {
                println!("Unknown command: {input}");
                println!("Type 'help' for a list of commands.");
            }
        }
    }
}

fn cmd_help() {
    println!("KERNEL COMMAND REFERENCE");
    println!("  help                 show this help message");
    println!("  clear                clear the screen");
    println!("  mount                mount the FAT32 filesystem");
    println!("  unmount              unmount the filesystem");
    println!("  formatfs             format the disk as FAT32");
    println!("  ls                   list files");
    println!("  cat <name>           print a file");
    println!("  write <name> <text>  write text to a file");
    println!("  rm <name>            delete a file");
    println!("  mv <old> <new>       rename a file");
    println!("  cp <src> <dst>       copy a file");
    println!("  chkdsk               reclaim orphaned clusters");
    println!("  pciscan              list PCI devices");
    println!("  dmadump <hexaddr>    dump 256 bytes of memory");
    println!("  ticks                show timer ticks since boot");
}

// ─── Filesystem commands ───────────────────────────────────────────────────────

fn cmd_mount() {
    let mut volume = VOLUME.lock();
    if volume.is_some() {
        println!("Already mounted.");
        return;
    }
    match Volume::mount(AtaDisk) {
        Ok(vol) => {
            *volume = Some(vol);
            println!("FAT32 filesystem mounted successfully.");
        }
        Err(e) => println!("Mount failed: {e}."),
    }
}

fn cmd_unmount() {
    match VOLUME.lock().take() {
        Some(_) => println!("FAT32 filesystem unmounted."),
        None => println!("Nothing is mounted."),
    }
}

fn cmd_formatfs() {
    if VOLUME.lock().is_some() {
        println!("Unmount the filesystem before formatting.");
        return;
    }
    if !disk::present() {
        println!("No disk present.");
        return;
    }

    let total_sectors = disk::sector_count().min(u32::MAX as u64) as u32;
    let sec_per_clus = suggest_sectors_per_cluster(total_sectors);
    println!("=== FAT32 Format Utility ===");
    println!(
        "Disk size: {} sectors ({} MB).",
        total_sectors,
        total_sectors as u64 * 512 / (1024 * 1024)
    );
    println!(
        "Cluster size: {} sectors ({} KB).",
        sec_per_clus,
        sec_per_clus as u32 * 512 / 1024
    );
    println!("WARNING: this will erase all data on the disk!");
    print!("Continue with format? (y/N): ");

    let mut line = [0u8; MAX_COMMAND_LENGTH];
    let len = read_line(&mut line);
    if len == 0 || !(line[0] == b'y' || line[0] == b'Y') {
        println!("Format cancelled.");
        return;
    }

    println!("Formatting...");
    match format(&mut AtaDisk, total_sectors, sec_per_clus) {
        Ok(()) => println!("Format complete. Use 'mount' to mount the new filesystem."),
        Err(e) => println!("Format failed: {e}."),
    }
}

fn cmd_ls() {
    with_volume(|vol| {
        let mut entries: [Entry; 48] = core::array::from_fn(|_| Entry {
            cluster: 0,
            size: 0,
            is_dir: false,
            name: [0; 12],
            name_len: 0,
        });
        match vol.read_dir(&mut entries) {
            Ok(count) => {
                for e in &entries[..count] {
                    let name = core::str::from_utf8(&e.name[..e.name_len]).unwrap_or("?");
                    if e.is_dir {
                        println!("{name:<14} <DIR>");
                    } else {
                        println!("{name:<14} {}", e.size);
                    }
                }
                println!("{count} file(s).");
            }
            Err(e) => println!("Error: {e}."),
        }
    });
}

fn cmd_cat(args: &str) {
    if args.is_empty() {
        println!("Usage: cat <name>");
        return;
    }
    with_volume(|vol| {
        let mut buf = vec![0u8; 4096];
        match vol.read_to_buffer(args, &mut buf) {
            Ok(n) => {
                for &b in &buf[..n] {
                    print!("{}", b as char);
                }
                if n > 0 && buf[n - 1] != b'\n' {
                    println!();
                }
            }
            Err(e) => println!("Error: {e}."),
        }
    });
}

fn cmd_write(args: &str) {
    let Some((name, text)) = args.split_once(' ') else {
        println!("Usage: write <name> <text>");
        return;
    };
    with_volume(|vol| {
        report(vol.write(name, text.as_bytes()), "File written.");
    });
}

fn cmd_rm(args: &str) {
    if args.is_empty() {
        println!("Usage: rm <name>");
        return;
    }
    with_volume(|vol| report(vol.remove(args), "File deleted."));
}

fn cmd_mv(args: &str) {
    let Some((old, new)) = args.split_once(' ') else {
        println!("Usage: mv <old> <new>");
        return;
    };
    with_volume(|vol| report(vol.rename(old, new.trim()), "File renamed."));
}

fn cmd_cp(args: &str) {
    let Some((src, dst)) = args.split_once(' ') else {
        println!("Usage: cp <src> <dst>");
        return;
    };
    with_volume(|vol| report(vol.copy(src, dst.trim()), "File copied."));
}

fn cmd_chkdsk() {
    with_volume(|vol| match vol.check() {
        Ok(0) => println!("chkdsk: filesystem clean, 0 orphans."),
        Ok(n) => println!("chkdsk: reclaimed {n} orphaned cluster(s)."),
        Err(e) => println!("Error: {e}."),
    });
}

// ─── Hardware commands ─────────────────────────────────────────────────────────

fn cmd_pciscan() {
    let mut count = 0;
    pci::for_each_device(|dev| {
        println!(
            "{:02x}:{:02x}  {:04x}:{:04x}  class {:02x}.{:02x}.{:02x}  BAR0 {:#010x}",
            dev.bus,
            dev.device,
            dev.vendor_id,
            dev.device_id,
            dev.class_code,
            dev.subclass,
            dev.prog_if,
            dev.bar0
        );
        count += 1;
    });
    println!("{count} device(s).");
}

fn cmd_dmadump(args: &str) {
    let Some(addr) = parse_hex(args) else {
        println!("Usage: dmadump <hexaddr>");
        return;
    };
    for row in 0..16u64 {
        print!("{:016x}  ", addr + row * 16);
        for col in 0..16u64 {
            let byte = unsafe { core::ptr::read_volatile((addr + row * 16 + col) as *const u8) };
            print!("{byte:02x} ");
        }
        println!();
    }
}

fn parse_hex(s: &str) -> Option<u64> {
    let s = s.trim().trim_start_matches("0x");
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}
