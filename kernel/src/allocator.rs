//! Kernel heap: `talc` over a static arena, claimed on first OOM.
//! Used by `cp`'s temporary file buffer and chkdsk's cluster bitmap.

use talc::{ClaimOnOom, Span, Talc, Talck};

const HEAP_SIZE: usize = 4 * 1024 * 1024;

static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: Talck<spin::Mutex<()>, ClaimOnOom> = Talc::new(unsafe {
    ClaimOnOom::new(Span::from_array(core::ptr::addr_of!(HEAP).cast_mut()))
})
.lock();
