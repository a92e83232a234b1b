//! Device context structures.
//!
//! Only what the keyboard path needs: a slot context and two endpoint
//! contexts (the default control endpoint and the interrupt-IN endpoint),
//! laid out back to back in one 64-byte-aligned DMA buffer.

pub const EP_TYPE_CONTROL: u32 = 4;
pub const EP_TYPE_INTERRUPT_IN: u32 = 7;

/// Endpoint state "running".
const EP_STATE_RUNNING: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotContext {
    pub dev_info: u32,
    pub port_info: u32,
    pub tt_info: u32,
    pub dev_state: u32,
    _reserved: [u32; 4],
}

impl SlotContext {
    /// One context entry, default slot state.
    pub fn keyboard() -> Self {
        SlotContext {
            dev_info: (1 << 27) | 1,
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointContext {
    pub ep_info: u32,
    pub ep_info2: u32,
    pub dequeue_ptr: u64,
    pub transfer_info: u32,
    _reserved: [u32; 3],
}

impl EndpointContext {
    fn new(ep_type: u32, max_packet: u32, dequeue_ptr: u64, avg_trb_len: u32) -> Self {
        EndpointContext {
            ep_info: (ep_type << 3) | EP_STATE_RUNNING,
            ep_info2: max_packet << 16,
            // Bit 0 of the dequeue pointer is the Dequeue Cycle State.
            dequeue_ptr: dequeue_ptr | 1,
            transfer_info: avg_trb_len,
            _reserved: [0; 3],
        }
    }

    pub fn control(transfer_ring: u64) -> Self {
        Self::new(EP_TYPE_CONTROL, 64, transfer_ring, 8)
    }

    /// Interrupt-IN endpoint sized for the 8-byte HID boot report.
    pub fn interrupt_in(transfer_ring: u64) -> Self {
        Self::new(EP_TYPE_INTERRUPT_IN, 8, transfer_ring, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_are_32_bytes() {
        assert_eq!(core::mem::size_of::<SlotContext>(), 32);
        assert_eq!(core::mem::size_of::<EndpointContext>(), 32);
    }

    #[test]
    fn interrupt_in_endpoint_layout() {
        let ep = EndpointContext::interrupt_in(0x4000);
        assert_eq!(ep.ep_info, (EP_TYPE_INTERRUPT_IN << 3) | 1);
        assert_eq!(ep.ep_info2 >> 16, 8);
        assert_eq!(ep.dequeue_ptr, 0x4001);
        assert_eq!(ep.transfer_info, 8);
    }
}
