#![no_std]
#![no_main]

extern crate alloc;
extern crate kernel;

use core::sync::atomic::{AtomicBool, Ordering};
use kernel::drivers::{disk, vga};
use kernel::{gdt, hlt_loop, interrupt, logger, pci, shell, usb};

/// The boot stub drops us here in long mode with a stack and identity
/// mapping already set up.
#[no_mangle]
extern "C" fn _start() -> ! {
    kernel_main()
}

fn kernel_main() -> ! {
    vga::init();
    logger::init().unwrap();
    log::info!("Welcome to KarstOS! V:0.1.0");

    gdt::init();
    log::info!("GDT initialized.");

    // The xHCI interrupt line has to be known before the IDT is built.
    let xhci_dev = pci::find_xhci();
    interrupt::init(xhci_dev.map(|dev| dev.interrupt_line));
    log::info!("IDT and PIC initialized.");
    x86_64::instructions::interrupts::enable();

    disk::init();
    usb::init(xhci_dev);

    log::info!("Boot complete.");
    shell::run()
}

static DID_PANIC: AtomicBool = AtomicBool::new(false);

#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    if !DID_PANIC.swap(true, Ordering::Relaxed) {
        log::error!("{info}");
    }
    hlt_loop()
}
