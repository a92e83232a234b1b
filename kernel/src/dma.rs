//! DMA-coherent buffer arena.
//!
//! Device-visible structures (DCBAA, rings, device contexts, HID report
//! buffers) need physically contiguous, aligned, zeroed memory that the
//! controller can address directly. The kernel runs identity mapped, so a
//! static arena inside the image satisfies that; a bump pointer hands out
//! aligned slices of it.

use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

const ARENA_SIZE: usize = 256 * 1024;
pub const MAX_ALIGN: usize = 4096;

#[repr(C, align(4096))]
struct Arena([u8; ARENA_SIZE]);

static mut ARENA: Arena = Arena([0; ARENA_SIZE]);

struct Bump {
    /// Offset of the next free byte.
    next: usize,
    /// Offset of the most recent allocation, for LIFO reclaim.
    last: usize,
}

static STATE: Mutex<Bump> = Mutex::new(Bump { next: 0, last: 0 });
static HIGH_WATER: AtomicU64 = AtomicU64::new(0);

fn arena_base() -> u64 {
    core::ptr::addr_of!(ARENA) as u64
}

/// An owned, aligned, zero-filled region of the DMA arena. The address is
/// both the kernel pointer and the device-visible address.
pub struct DmaBuffer {
    addr: u64,
    len: usize,
}

impl DmaBuffer {
    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.addr as *const u8, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.addr as *mut u8, self.len) }
    }
}

/// Allocate `len` bytes aligned to `align` (a power of two, at most 4096).
/// The region comes back zero-filled. `None` means the arena is exhausted,
/// which is fatal during bring-up.
pub fn allocate(len: usize, align: usize) -> Option<DmaBuffer> {
    debug_assert!(align.is_power_of_two() && align <= MAX_ALIGN);

    let base = arena_base();
    let mut state = STATE.lock();

    let addr = (base + state.next as u64).next_multiple_of(align as u64);
    let offset = (addr - base) as usize;
    if offset + len > ARENA_SIZE {
        return None;
    }

    state.last = offset;
    state.next = offset + len;
    HIGH_WATER.fetch_max(state.next as u64, Ordering::Relaxed);

    unsafe { core::ptr::write_bytes(addr as *mut u8, 0, len) };
    Some(DmaBuffer { addr, len })
}

/// Return a buffer to the arena. Only the most recent allocation can be
/// reclaimed; anything else stays allocated for the lifetime of the kernel,
/// which is exactly the usage pattern of the xHCI structures.
pub fn free(buf: DmaBuffer) {
    let mut state = STATE.lock();
    let offset = (buf.addr - arena_base()) as usize;
    if offset == state.last && offset + buf.len == state.next {
        state.next = state.last;
    }
}

pub fn bytes_used() -> u64 {
    HIGH_WATER.load(Ordering::Relaxed)
}
