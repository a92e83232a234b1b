//! IDT setup and legacy 8259 PIC plumbing.
//!
//! Three hardware sources: the PIT tick on IRQ 0, the PS/2 keyboard on
//! IRQ 1, and the xHCI controller on whatever line its PCI config reports.
//! The xHCI vector has to be known before the IDT is built, so `init`
//! takes it as an argument and the PCI probe runs first during boot.

mod handlers;

use core::sync::atomic::{AtomicU8, Ordering};
use lazy_static::lazy_static;
use pic8259::ChainedPics;
use x86_64::structures::idt::InterruptDescriptorTable;

use crate::gdt;

pub const PIC_1_OFFSET: u8 = 0x20;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: spin::Mutex<ChainedPics> =
    spin::Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptVector {
    Timer = PIC_1_OFFSET,
    Keyboard,
}

/// Vector the xHCI handler was registered at; 0 while USB is not wired up.
static XHCI_VECTOR: AtomicU8 = AtomicU8::new(0);

pub fn xhci_vector() -> Option<u8> {
    match XHCI_VECTOR.load(Ordering::Relaxed) {
        0 => None,
        v => Some(v),
    }
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(handlers::breakpoint_handler);
        idt.page_fault.set_handler_fn(handlers::page_fault_handler);
        idt.general_protection_fault
            .set_handler_fn(handlers::general_protection_fault_handler);
        unsafe {
            idt.double_fault
                .set_handler_fn(handlers::double_fault_handler)
                .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt[InterruptVector::Timer as u8].set_handler_fn(handlers::timer_interrupt_handler);
        idt[InterruptVector::Keyboard as u8].set_handler_fn(handlers::keyboard_interrupt_handler);
        if let Some(vector) = xhci_vector() {
            idt[vector].set_handler_fn(handlers::xhci_interrupt_handler);
        }
        idt
    };
}

/// Load the IDT, remap and unmask the PICs, start the PIT. `xhci_irq` is the
/// controller's PCI interrupt line, if one was found.
pub fn init(xhci_irq: Option<u8>) {
    if let Some(irq) = xhci_irq {
        if irq < 16 {
            XHCI_VECTOR.store(PIC_1_OFFSET + irq, Ordering::Relaxed);
        }
    }

    IDT.load();

    // Timer, keyboard and the cascade line; everything else stays masked
    // until a driver asks for it.
    let mut mask1: u8 = !0b0000_0111;
    let mut mask2: u8 = 0xFF;
    if let Some(irq) = xhci_irq {
        if irq < 8 {
            mask1 &= !(1 << irq);
        } else if irq < 16 {
            mask2 &= !(1 << (irq - 8));
        }
    }

    unsafe {
        let mut pics = PICS.lock();
        pics.initialize();
        pics.write_masks(mask1, mask2);
    }

    crate::time::init_pit();
}

/// Signal end-of-interrupt; the chained driver notifies the slave PIC too
/// when the vector belongs to it.
pub(crate) fn end_of_interrupt(vector: u8) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(vector);
    }
}
