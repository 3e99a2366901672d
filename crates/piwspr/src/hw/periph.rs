// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The `/dev/mem` peripheral window.
//!
//! Maps the 16 MiB peripheral range once per process and exposes volatile
//! 32-bit register access addressed by *bus* address: the accessor performs
//! `base_virt + (bus_addr - 0x7E000000)` internally, so callers use the
//! addresses from the Broadcom manual unchanged.
//!
//! Register reads and writes go through `read_volatile`/`write_volatile`;
//! the compiler can neither reorder nor elide them across accessor calls.

use std::io;
use std::ptr;

use super::{PERI_BUS_BASE, PERI_WINDOW_LEN};
use crate::{Error, Result};

/// Mask of the DRAM cache-alias bits in a bus address.
const BUS_ALIAS_MASK: u32 = 0xC000_0000;

/// One-time mapping of the SoC peripheral window.
///
/// Constructed once by the transmitter facade; the mapping lives until the
/// facade is torn down (or the process exits). All accessors take bus
/// addresses inside the peripheral window.
pub struct PeripheralMap {
    base: *mut u32,
}

// SAFETY: the mapping targets device memory shared with the DMA engine; all
// access is volatile and word-sized, and the crate's concurrency model
// allows only one thread (the transmit worker) to touch registers at a time.
unsafe impl Send for PeripheralMap {}
unsafe impl Sync for PeripheralMap {}

impl PeripheralMap {
    /// Map the peripheral window at the given physical base.
    ///
    /// # Errors
    ///
    /// [`Error::MappingFailed`] when `/dev/mem` cannot be opened (needs
    /// root) or the mapping itself fails. Both are fatal for the caller.
    pub fn map(peripheral_base: u32) -> Result<PeripheralMap> {
        // SAFETY: the path is a valid NUL-terminated literal; open returns
        // -1 on failure (checked below).
        let fd = unsafe {
            libc::open(
                c"/dev/mem".as_ptr(),
                libc::O_RDWR | libc::O_SYNC | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(Error::MappingFailed(io::Error::last_os_error()));
        }

        // SAFETY:
        // - null hint lets the kernel pick the virtual address
        // - PROT_READ|PROT_WRITE with MAP_SHARED is the required mode for
        //   device registers; writes must reach the bus, not a private copy
        // - fd is valid from the open above; the offset is the physical
        //   peripheral base, page-aligned by construction
        // - mmap returns MAP_FAILED on error (checked below)
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                PERI_WINDOW_LEN,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                peripheral_base as libc::off_t,
            )
        };

        // SAFETY: fd is valid; the mapping (if any) keeps its own reference.
        unsafe { libc::close(fd) };

        if base == libc::MAP_FAILED {
            return Err(Error::MappingFailed(io::Error::last_os_error()));
        }

        log::debug!(
            "[HW] peripheral window mapped: phys {:#010x} -> {:p}",
            peripheral_base,
            base
        );
        Ok(PeripheralMap {
            base: base.cast::<u32>(),
        })
    }

    /// Translate a bus address into a register pointer.
    fn reg_ptr(&self, bus_addr: u32) -> *mut u32 {
        debug_assert!(
            (PERI_BUS_BASE..PERI_BUS_BASE + PERI_WINDOW_LEN as u32).contains(&bus_addr),
            "bus address {bus_addr:#010x} outside the peripheral window"
        );
        debug_assert_eq!(bus_addr % 4, 0, "unaligned register access");
        let offset = (bus_addr - PERI_BUS_BASE) as usize / 4;
        // SAFETY: offset is inside the mapped window (asserted above).
        unsafe { self.base.add(offset) }
    }

    /// Volatile read of the register at `bus_addr`.
    pub fn read(&self, bus_addr: u32) -> u32 {
        // SAFETY: reg_ptr yields a valid, aligned pointer into the mapping.
        unsafe { ptr::read_volatile(self.reg_ptr(bus_addr)) }
    }

    /// Volatile write of the register at `bus_addr`.
    pub fn write(&self, bus_addr: u32, value: u32) {
        // SAFETY: reg_ptr yields a valid, aligned pointer into the mapping.
        unsafe { ptr::write_volatile(self.reg_ptr(bus_addr), value) }
    }

    /// Read-modify-write: set a single bit.
    pub fn set_bit(&self, bus_addr: u32, bit: u32) {
        self.write(bus_addr, self.read(bus_addr) | (1 << bit));
    }

    /// Read-modify-write: clear a single bit.
    pub fn clear_bit(&self, bus_addr: u32, bit: u32) {
        self.write(bus_addr, self.read(bus_addr) & !(1 << bit));
    }
}

/// Strip the DRAM cache-alias bits from a bus address, yielding the
/// physical address `/dev/mem` understands.
pub fn bus_to_phys(bus_addr: u32) -> u32 {
    bus_addr & !BUS_ALIAS_MASK
}

impl Drop for PeripheralMap {
    fn drop(&mut self) {
        // SAFETY: base came from a successful mmap of PERI_WINDOW_LEN bytes
        // and Drop runs at most once.
        unsafe {
            libc::munmap(self.base.cast::<libc::c_void>(), PERI_WINDOW_LEN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_to_phys_strips_alias() {
        assert_eq!(bus_to_phys(0xC123_4000), 0x0123_4000);
        assert_eq!(bus_to_phys(0x4000_0000), 0x0000_0000);
        assert_eq!(bus_to_phys(0x0123_4000), 0x0123_4000);
    }
}
