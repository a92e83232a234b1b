//! PCI configuration space access over the legacy 0xCF8/0xCFC port pair,
//! plus the one lookup the kernel actually needs: the xHCI controller.

use x86_64::instructions::port::Port;

const CONFIG_ADDRESS: u16 = 0xCF8;
const CONFIG_DATA: u16 = 0xCFC;

const REG_VENDOR_DEVICE: u8 = 0x00;
const REG_COMMAND_STATUS: u8 = 0x04;
const REG_CLASS: u8 = 0x08;
const REG_BAR0: u8 = 0x10;
const REG_INTERRUPT_LINE: u8 = 0x3C;

// Command register bits
const CMD_MEMORY_SPACE: u32 = 1 << 1;
const CMD_BUS_MASTER: u32 = 1 << 2;

// xHCI: Serial Bus Controller / USB / xHCI
const CLASS_SERIAL_BUS: u8 = 0x0C;
const SUBCLASS_USB: u8 = 0x03;
const PROG_IF_XHCI: u8 = 0x30;

fn config_address(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    0x8000_0000
        | (bus as u32) << 16
        | (device as u32) << 11
        | (function as u32) << 8
        | (offset & 0xFC) as u32
}

pub fn read_config_dword(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    unsafe {
        Port::<u32>::new(CONFIG_ADDRESS).write(config_address(bus, device, function, offset));
        Port::<u32>::new(CONFIG_DATA).read()
    }
}

pub fn write_config_dword(bus: u8, device: u8, function: u8, offset: u8, value: u32) {
    unsafe {
        Port::<u32>::new(CONFIG_ADDRESS).write(config_address(bus, device, function, offset));
        Port::<u32>::new(CONFIG_DATA).write(value);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PciDevice {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    pub class_code: u8,
    pub subclass: u8,
    pub prog_if: u8,
    /// BAR0 with the low type bits masked off (memory-mapped BARs only).
    pub bar0: u64,
    pub interrupt_line: u8,
}

fn read_device(bus: u8, device: u8) -> Option<PciDevice> {
    let vendor_device = read_config_dword(bus, device, 0, REG_VENDOR_DEVICE);
    if vendor_device & 0xFFFF == 0xFFFF {
        return None;
    }

    let class = read_config_dword(bus, device, 0, REG_CLASS);
    Some(PciDevice {
        bus,
        device,
        function: 0,
        vendor_id: vendor_device as u16,
        device_id: (vendor_device >> 16) as u16,
        class_code: (class >> 24) as u8,
        subclass: (class >> 16) as u8,
        prog_if: (class >> 8) as u8,
        bar0: (read_config_dword(bus, device, 0, REG_BAR0) & 0xFFFF_FFF0) as u64,
        interrupt_line: read_config_dword(bus, device, 0, REG_INTERRUPT_LINE) as u8,
    })
}

/// Walk every bus/device and hand each present function 0 to `visit`.
pub fn for_each_device(mut visit: impl FnMut(&PciDevice)) {
    for bus in 0..=255u8 {
        for device in 0..32u8 {
            if let Some(dev) = read_device(bus, device) {
                visit(&dev);
            }
        }
    }
}

/// Scan for the USB 3.0 host controller.
pub fn find_xhci() -> Option<PciDevice> {
    let mut found = None;
    for_each_device(|dev| {
        if found.is_none()
            && dev.class_code == CLASS_SERIAL_BUS
            && dev.subclass == SUBCLASS_USB
            && dev.prog_if == PROG_IF_XHCI
        {
            found = Some(*dev);
        }
    });

    match &found {
        Some(dev) => log::info!(
            "xHCI controller {:04x}:{:04x} at bus {} device {}, BAR0 {:#x}, IRQ {}",
            dev.vendor_id,
            dev.device_id,
            dev.bus,
            dev.device,
            dev.bar0,
            dev.interrupt_line
        ),
        None => log::info!("no xHCI controller on the PCI bus"),
    }
    found
}

/// Memory-space plus bus-master enable, required before the controller can
/// DMA into the rings.
pub fn enable_bus_master(dev: &PciDevice) {
    let command = read_config_dword(dev.bus, dev.device, dev.function, REG_COMMAND_STATUS);
    write_config_dword(
        dev.bus,
        dev.device,
        dev.function,
        REG_COMMAND_STATUS,
        command | CMD_MEMORY_SPACE | CMD_BUS_MASTER,
    );
}
