//! xHCI glue: bring the controller up over its BAR0 window, wire the HID
//! keyboard endpoint, and pump the event ring from the IRQ handler.
//!
//! Any bring-up failure is fatal for this driver only: the kernel keeps
//! running and PS/2 remains the input path.

use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;
use x86_64::instructions::interrupts::without_interrupts;

use xhci::{
    Controller, EndpointContext, Event, EventRing, HidKeyboard, KeyboardReport, Mmio,
    SlotContext, TransferRing, Trb, UsbSts, XhciError, COMPLETION_SUCCESS, REPORT_BYTES,
    RING_TRBS,
};

use crate::{dma, pci, shell};

/// First (and only) keyboard: slot 1, interrupt-IN endpoint 1.
const KEYBOARD_SLOT: u8 = 1;
const KEYBOARD_ENDPOINT: u8 = 1;

/// Volatile register access over the memory-mapped BAR0 window. The kernel
/// is identity mapped, so the bus address doubles as the pointer.
pub struct BarMmio {
    base: u64,
}

impl Mmio for BarMmio {
    fn read32(&self, offset: u64) -> u32 {
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write32(&mut self, offset: u64, value: u32) {
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

struct UsbKeyboard {
    controller: Controller<BarMmio>,
    events: EventRing<'static>,
    transfer_ring: TransferRing<'static>,
    report_buffer: u64,
    keyboard: HidKeyboard,
}

static USB: Mutex<Option<UsbKeyboard>> = Mutex::new(None);

/// When set, the PS/2 handler only drains its port; keys come from here.
static USB_KEYBOARD_ACTIVE: AtomicBool = AtomicBool::new(false);

pub fn keyboard_active() -> bool {
    USB_KEYBOARD_ACTIVE.load(Ordering::Acquire)
}

fn fatal(step: &str, err: XhciError) {
    log::error!("xHCI {step} failed: {err}; USB unavailable, PS/2 keyboard stays active");
}

/// Full bring-up. `dev` is the controller found by the PCI scan; `None`
/// leaves the PS/2 path as the only keyboard source.
pub fn init(dev: Option<pci::PciDevice>) {
    let Some(dev) = dev else {
        return;
    };

    pci::enable_bus_master(&dev);

    let mut controller = match Controller::probe(BarMmio { base: dev.bar0 }) {
        Ok(c) => c,
        Err(e) => return fatal("probe", e),
    };
    log::info!(
        "xHCI version {:#06x}, {} slots, {} ports",
        controller.hci_version,
        controller.max_slots,
        controller.max_ports
    );

    if let Err(e) = controller.halt() {
        return fatal("halt", e);
    }
    if let Err(e) = controller.reset() {
        return fatal("reset", e);
    }

    // Controller-owned structures, allocated once and never freed.
    let Some(dcbaa) = dma::allocate((controller.max_slots as usize + 1) * 8, 64) else {
        return log::error!("xHCI: DMA arena exhausted allocating the DCBAA");
    };
    controller.install_dcbaa(dcbaa.addr());

    let Some(cmd_ring) = dma::allocate(RING_TRBS * core::mem::size_of::<Trb>(), 64) else {
        return log::error!("xHCI: DMA arena exhausted allocating the command ring");
    };
    controller.install_command_ring(cmd_ring.addr());

    controller.set_enabled_slots(controller.max_slots);
    if let Err(e) = controller.start() {
        return fatal("start", e);
    }
    controller.ring_doorbell(0, 0);

    let mut connected = false;
    for port in 0..controller.max_ports {
        if controller.port_state(port).connected {
            log::info!("USB device connected on port {}", port + 1);
            connected = true;
        }
    }
    if !connected {
        log::info!("no USB devices connected; PS/2 keyboard stays active");
        return;
    }

    // Keyboard endpoint plumbing: transfer ring, device context, report
    // buffer, and the first queued transfer.
    let Some(mut ring_buf) = dma::allocate(RING_TRBS * core::mem::size_of::<Trb>(), 64) else {
        return log::error!("xHCI: DMA arena exhausted allocating the transfer ring");
    };
    let trbs: &'static mut [Trb] = unsafe {
        core::slice::from_raw_parts_mut(ring_buf.as_mut_slice().as_mut_ptr() as *mut Trb, RING_TRBS)
    };
    let mut transfer_ring = TransferRing::new(trbs, ring_buf.addr());

    let Some(ctx) = dma::allocate(3 * 32, 64) else {
        return log::error!("xHCI: DMA arena exhausted allocating the device context");
    };
    unsafe {
        let base = ctx.addr();
        core::ptr::write_volatile(base as *mut SlotContext, SlotContext::keyboard());
        core::ptr::write_volatile(
            (base + 32) as *mut EndpointContext,
            EndpointContext::control(transfer_ring.base()),
        );
        core::ptr::write_volatile(
            (base + 64) as *mut EndpointContext,
            EndpointContext::interrupt_in(transfer_ring.base()),
        );
    }

    let Some(report) = dma::allocate(REPORT_BYTES, 64) else {
        return log::error!("xHCI: DMA arena exhausted allocating the report buffer");
    };
    transfer_ring.push_normal(report.addr(), REPORT_BYTES as u32);

    let Some(event_buf) = dma::allocate(RING_TRBS * core::mem::size_of::<Trb>(), 64) else {
        return log::error!("xHCI: DMA arena exhausted allocating the event ring");
    };
    let event_trbs: &'static [Trb] = unsafe {
        core::slice::from_raw_parts(event_buf.addr() as *const Trb, RING_TRBS)
    };
    let events = EventRing::new(event_trbs);

    let usb = UsbKeyboard {
        controller,
        events,
        transfer_ring,
        report_buffer: report.addr(),
        keyboard: HidKeyboard::new(),
    };

    without_interrupts(|| {
        let mut guard = USB.lock();
        *guard = Some(usb);
        guard.as_mut().unwrap().controller.enable_interrupts();
    });
    USB_KEYBOARD_ACTIVE.store(true, Ordering::Release);
    log::info!(
        "USB keyboard path active (slot {KEYBOARD_SLOT}, endpoint {KEYBOARD_ENDPOINT}), {} bytes of DMA arena in use",
        dma::bytes_used()
    );
}

/// IRQ top-half: dispatch on USBSTS, pump the event ring on EINT, and
/// acknowledge what was handled (write-1-to-clear).
pub fn on_interrupt() {
    let mut guard = USB.lock();
    let Some(usb) = guard.as_mut() else {
        return;
    };

    let status = usb.controller.status();

    if status.contains(UsbSts::EINT) {
        pump_events(usb);
        usb.controller.ack_status(UsbSts::EINT);
    }
    if status.contains(UsbSts::HSE) {
        log::error!("xHCI host system error");
        usb.controller.ack_status(UsbSts::HSE);
    }
    if status.contains(UsbSts::PCD) {
        // Port change processing is not wired up; just acknowledge.
        usb.controller.ack_status(UsbSts::PCD);
    }
}

/// Consume every valid TRB on the event ring. Stops at the first cycle-bit
/// mismatch; unknown TRB types are skipped.
fn pump_events(usb: &mut UsbKeyboard) {
    while let Some(event) = usb.events.pop() {
        match event {
            Event::Transfer {
                slot,
                endpoint,
                completion,
                length,
                buffer,
            } => {
                if slot == KEYBOARD_SLOT
                    && endpoint == KEYBOARD_ENDPOINT
                    && completion == COMPLETION_SUCCESS
                    && length >= REPORT_BYTES as u32
                    && buffer != 0
                {
                    let mut raw = [0u8; REPORT_BYTES];
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            buffer as *const u8,
                            raw.as_mut_ptr(),
                            REPORT_BYTES,
                        );
                    }
                    usb.keyboard
                        .process(KeyboardReport::from_bytes(raw), shell::on_key);

                    // Queue the next report transfer and tell the controller.
                    let report_buffer = usb.report_buffer;
                    usb.transfer_ring.push_normal(report_buffer, REPORT_BYTES as u32);
                    usb.controller.ring_doorbell(slot as u32, endpoint as u32);
                }
            }
            Event::CommandCompletion { completion, .. } => {
                if completion == COMPLETION_SUCCESS {
                    log::debug!("xHCI command completed");
                } else {
                    log::warn!("xHCI command failed with completion code {completion}");
                }
            }
            Event::Other { trb_type } => {
                log::debug!("skipping event TRB type {trb_type}");
            }
        }
    }
}
