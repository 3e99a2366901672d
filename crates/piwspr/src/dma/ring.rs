// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The control-block ring and the peripherals that drive it.
//!
//! 1024 control blocks across eight uncached pages, circularly linked by
//! bus address. Blocks alternate roles:
//!
//! - even blocks copy one tuning word into `CM_GP0DIV` (retunes the
//!   carrier),
//! - odd blocks copy one word into the PWM FIFO with DREQ pacing; their
//!   transfer length is the number of PWM clocks the carrier holds the
//!   frequency the preceding block selected.
//!
//! The wire protocol with the engine is deliberately thin: software reads
//! `DMA_CS` and `DMA_CONBLK_AD` only, and never writes a block while the
//! engine's current-block register points at it.

use std::thread;
use std::time::{Duration, Instant};

use super::cb::{ti_permap, CbSlot, ControlBlock, DREQ_PWM, TI_DEST_DREQ, TI_NO_WIDE_BURSTS};
use super::tuning::TuningTable;
use crate::hw::{
    PeripheralMap, UncachedPool, CM_GP0DIV_BUS, CM_PWMCTL_BUS, CM_PWMDIV_BUS, DMA_BUS_BASE,
    PAGE_SIZE, PWM_BUS_BASE,
};
use crate::{Error, Result};

/// Blocks in the ring.
pub const RING_BLOCKS: usize = 1024;
/// Divider/pacing pairs in the ring.
pub const RING_PAIRS: usize = RING_BLOCKS / 2;

const CBS_PER_PAGE: usize = PAGE_SIZE / std::mem::size_of::<ControlBlock>();

/// DMA channel 0 register offsets.
const DMA_CS: u32 = 0x00;
const DMA_CONBLK_AD: u32 = 0x04;
const DMA_TI: u32 = 0x08;

/// CS: reset the channel.
const CS_RESET: u32 = 1 << 31;
/// CS: activate, top priority and panic priority.
const CS_ACTIVE_TOP_PRIORITY: u32 = (1 << 0) | (255 << 16);

/// PWM register offsets.
const PWM_CTL: u32 = 0x00;
const PWM_STA: u32 = 0x04;
const PWM_DMAC: u32 = 0x08;
const PWM_RNG1: u32 = 0x10;
const PWM_FIF1: u32 = 0x18;
const PWM_RNG2: u32 = 0x20;

/// How long a busy-wait may watch `DMA_CONBLK_AD` sit on one block before
/// the engine is declared hung. A healthy engine clears a maximum-length
/// pacing block in well under a millisecond.
const HANG_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval of the busy-wait.
const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// The circular descriptor list plus a pair-aligned write cursor.
pub struct CbRing {
    slots: Vec<CbSlot>,
    pair_cursor: usize,
}

impl CbRing {
    /// Carve the ring out of the pool and wire every block.
    ///
    /// All blocks initially select a filler tuning slot; nothing reaches
    /// the divider until a symbol retargets them.
    pub fn build(pool: &mut UncachedPool, tuning: &TuningTable) -> Result<CbRing> {
        let mut slots = Vec::with_capacity(RING_BLOCKS);
        let filler = tuning.slot_bus(RING_PAIRS); // middle of the filler range

        while slots.len() < RING_BLOCKS {
            let page = pool.acquire()?;
            let base = page.virt.cast::<ControlBlock>();
            for i in 0..CBS_PER_PAGE.min(RING_BLOCKS - slots.len()) {
                // SAFETY: i is within the freshly acquired 4096-byte page.
                let virt = unsafe { base.add(i) };
                let bus = page.bus + (i * std::mem::size_of::<ControlBlock>()) as u32;
                let slot = CbSlot::new(virt, bus);
                if slots.len() % 2 == 0 {
                    // Divider write: one word into CM_GP0DIV.
                    slot.init(TI_NO_WIDE_BURSTS, filler, CM_GP0DIV_BUS, 4, 4);
                } else {
                    // Pacing: one word into the PWM FIFO, DREQ gated.
                    slot.init(
                        TI_DEST_DREQ | ti_permap(DREQ_PWM) | TI_NO_WIDE_BURSTS,
                        filler,
                        PWM_BUS_BASE + PWM_FIF1,
                        4,
                        0,
                    );
                }
                slots.push(slot);
            }
        }

        for i in 0..RING_BLOCKS {
            slots[i].link_to(slots[(i + 1) % RING_BLOCKS].bus_addr());
        }

        Ok(CbRing {
            slots,
            pair_cursor: 0,
        })
    }

    /// Bring up the PWM clock and controller that pace the ring.
    ///
    /// PWM clock source PLLD, divisor 2; serializer fed from the FIFO in
    /// repeat mode with range 32; DMA requests enabled with PANIC/DREQ
    /// thresholds of 7.
    pub fn configure_pwm(&self, periph: &PeripheralMap) {
        let settle = Duration::from_micros(1000);

        periph.write(CM_PWMCTL_BUS, 0x5A00_0026); // source PLLD, kill
        thread::sleep(settle);
        periph.write(CM_PWMDIV_BUS, 0x5A00_2000); // divisor 2 -> 250 MHz
        periph.write(CM_PWMCTL_BUS, 0x5A00_0016); // source PLLD, enable
        thread::sleep(settle);

        periph.write(PWM_BUS_BASE + PWM_CTL, 0);
        thread::sleep(settle);
        periph.write(PWM_BUS_BASE + PWM_STA, u32::MAX); // clear error flags
        thread::sleep(settle);
        periph.write(PWM_BUS_BASE + PWM_RNG1, 32);
        periph.write(PWM_BUS_BASE + PWM_RNG2, 32);
        periph.write(PWM_BUS_BASE + PWM_CTL, u32::MAX); // FIFO, repeat, serialize, enable
        thread::sleep(settle);
        periph.write(PWM_BUS_BASE + PWM_DMAC, (1 << 31) | 0x0707);
    }

    /// Reset channel 0, load the first block and start the engine.
    pub fn activate(&self, periph: &PeripheralMap) {
        periph.write(DMA_BUS_BASE + DMA_CS, CS_RESET);
        periph.write(DMA_BUS_BASE + DMA_CONBLK_AD, 0);
        periph.write(DMA_BUS_BASE + DMA_TI, 0);
        periph.write(DMA_BUS_BASE + DMA_CONBLK_AD, self.slots[0].bus_addr());
        periph.write(DMA_BUS_BASE + DMA_CS, CS_ACTIVE_TOP_PRIORITY);
        log::debug!("[DMA] channel 0 running from {:#010x}", self.slots[0].bus_addr());
    }

    /// Stop the engine by resetting channel 0.
    pub fn reset(&self, periph: &PeripheralMap) {
        periph.write(DMA_BUS_BASE + DMA_CS, CS_RESET);
    }

    /// Advance to the next divider/pacing pair.
    pub fn next_pair(&mut self) -> (CbSlot, CbSlot) {
        self.pair_cursor = (self.pair_cursor + 1) % RING_PAIRS;
        (
            self.slots[2 * self.pair_cursor],
            self.slots[2 * self.pair_cursor + 1],
        )
    }

    /// Block until the engine is not executing the given block.
    ///
    /// This is the only ordering primitive between the CPU and the engine:
    /// a block may be rewritten exactly when `DMA_CONBLK_AD` points
    /// elsewhere. The initial cursor position is unknown (the engine may
    /// be anywhere in the ring when a transmission starts), which this
    /// wait absorbs naturally.
    pub fn wait_not_current(&self, periph: &PeripheralMap, slot: &CbSlot) -> Result<()> {
        let started = Instant::now();
        while periph.read(DMA_BUS_BASE + DMA_CONBLK_AD) == slot.bus_addr() {
            if started.elapsed() > HANG_TIMEOUT {
                return Err(Error::HardwareHung("DMA channel 0"));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}
