// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DMA control-block layout.
//!
//! A control block is the 32-byte descriptor the BCM DMA engine consumes:
//! transfer info, source and destination bus addresses, length, 2D stride,
//! and the bus address of the next block. The engine follows `nextconbk`
//! until it reads zero, which never happens here because the ring closes on
//! itself.
//!
//! Blocks live in uncached pages shared with the engine, so every field
//! access from the CPU side is volatile.

use std::ptr;

/// Transfer info: destination gated on peripheral DREQ.
pub const TI_DEST_DREQ: u32 = 1 << 6;
/// Transfer info: don't issue wide bursts.
pub const TI_NO_WIDE_BURSTS: u32 = 1 << 26;
/// DREQ line of the PWM controller.
pub const DREQ_PWM: u32 = 5;

/// Transfer-info peripheral mapping field.
pub const fn ti_permap(peripheral: u32) -> u32 {
    peripheral << 16
}

/// One 32-byte DMA descriptor, exactly as the engine reads it.
#[repr(C)]
pub struct ControlBlock {
    /// Transfer information flags.
    pub ti: u32,
    /// Source bus address.
    pub source_ad: u32,
    /// Destination bus address.
    pub dest_ad: u32,
    /// Transfer length in bytes.
    pub txfr_len: u32,
    /// 2D stride; ignored for the linear transfers used here.
    pub stride: u32,
    /// Bus address of the next control block.
    pub nextconbk: u32,
    reserved: [u32; 2],
}

/// A control block's two addresses: CPU-side pointer and engine-side bus
/// address.
#[derive(Debug, Clone, Copy)]
pub struct CbSlot {
    virt: *mut ControlBlock,
    bus: u32,
}

// SAFETY: slots index into the uncached pool mapping owned by the engine
// struct; the ring's single-writer protocol serializes access.
unsafe impl Send for CbSlot {}

impl CbSlot {
    pub(crate) fn new(virt: *mut ControlBlock, bus: u32) -> CbSlot {
        CbSlot { virt, bus }
    }

    /// Bus address the DMA engine uses for this block.
    pub fn bus_addr(&self) -> u32 {
        self.bus
    }

    /// Initialize every field of the block.
    pub fn init(&self, ti: u32, source_ad: u32, dest_ad: u32, txfr_len: u32, stride: u32) {
        // SAFETY: virt points into the mapped uncached pool; field writes
        // are volatile because the DMA engine reads the same bytes.
        unsafe {
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).ti), ti);
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).source_ad), source_ad);
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).dest_ad), dest_ad);
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).txfr_len), txfr_len);
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).stride), stride);
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).reserved), [0, 0]);
        }
    }

    /// Point the block at the next one in the ring.
    pub fn link_to(&self, next_bus: u32) {
        // SAFETY: see `init`.
        unsafe {
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).nextconbk), next_bus);
        }
    }

    /// Retarget the source address (selects a tuning slot).
    pub fn set_source(&self, source_ad: u32) {
        // SAFETY: see `init`.
        unsafe {
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).source_ad), source_ad);
        }
    }

    /// Rewrite the transfer length (dwell in PWM clocks for pacing blocks).
    pub fn set_txfr_len(&self, len: u32) {
        // SAFETY: see `init`.
        unsafe {
            ptr::write_volatile(ptr::addr_of_mut!((*self.virt).txfr_len), len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_block_is_32_bytes() {
        assert_eq!(std::mem::size_of::<ControlBlock>(), 32);
    }

    #[test]
    fn test_permap_field_position() {
        assert_eq!(ti_permap(DREQ_PWM), 5 << 16);
    }

    #[test]
    fn test_slot_writes_land_in_struct() {
        let mut block = ControlBlock {
            ti: 0,
            source_ad: 0,
            dest_ad: 0,
            txfr_len: 0,
            stride: 0,
            nextconbk: 0,
            reserved: [0, 0],
        };
        let slot = CbSlot::new(&mut block, 0xC000_1000);
        slot.init(TI_NO_WIDE_BURSTS, 0x11, 0x22, 4, 0);
        slot.link_to(0xC000_1020);
        slot.set_txfr_len(1234);
        assert_eq!(block.ti, TI_NO_WIDE_BURSTS);
        assert_eq!(block.source_ad, 0x11);
        assert_eq!(block.dest_ad, 0x22);
        assert_eq!(block.txfr_len, 1234);
        assert_eq!(block.nextconbk, 0xC000_1020);
        assert_eq!(slot.bus_addr(), 0xC000_1000);
    }
}
