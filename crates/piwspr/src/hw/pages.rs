// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Uncached page pool.
//!
//! One mailbox allocation backs every page the DMA synthesizer touches:
//! the tuning table and the control-block ring. The firmware hands back a
//! bus address in the uncached DRAM alias, so the DMA engine and the CPU
//! see each other's writes without cache maintenance; the CPU side reaches
//! the same bytes through a `/dev/mem` mapping of the corresponding
//! physical range.
//!
//! Pages are never freed individually. The pool hands them out behind a
//! monotonic cursor and reclaims everything at teardown: unmap, unlock,
//! free, in that order, tolerating partial initialization.

use std::io;
use std::ptr;

use super::mailbox::Mailbox;
use super::periph::bus_to_phys;
use super::PAGE_SIZE;
use crate::{Error, Result};

/// One uncached page: where the DMA engine sees it and where we do.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// Bus address (uncached DRAM alias) for DMA descriptors.
    pub bus: u32,
    /// Userspace virtual address of the same bytes.
    pub virt: *mut u8,
}

// SAFETY: a Page is a pair of addresses into the pool's shared mapping; the
// single-writer protocol of the ring governs actual access.
unsafe impl Send for Page {}

/// Pool of physically contiguous uncached pages.
pub struct UncachedPool {
    mbox: Mailbox,
    handle: u32,
    bus_base: u32,
    virt_base: *mut u8,
    capacity: usize,
    cursor: usize,
}

// SAFETY: the pool is moved into the transmit worker along with the rest of
// the engine; the mapping itself is process-wide.
unsafe impl Send for UncachedPool {}

impl UncachedPool {
    /// Allocate and map `pages` uncached pages through the mailbox.
    ///
    /// # Errors
    ///
    /// [`Error::MailboxFailed`] or [`Error::MappingFailed`]; both are fatal
    /// for facade construction. Anything acquired before the failure is
    /// released again.
    pub fn alloc(mbox: Mailbox, pages: usize, mem_flag: u32) -> Result<UncachedPool> {
        let bytes = (pages * PAGE_SIZE) as u32;
        let handle = mbox.mem_alloc(bytes, PAGE_SIZE as u32, mem_flag)?;

        let bus_base = match mbox.mem_lock(handle) {
            Ok(bus) => bus,
            Err(e) => {
                let _ = mbox.mem_free(handle);
                return Err(e);
            }
        };

        let virt_base = match map_phys(bus_to_phys(bus_base), pages * PAGE_SIZE) {
            Ok(virt) => virt,
            Err(e) => {
                let _ = mbox.mem_unlock(handle);
                let _ = mbox.mem_free(handle);
                return Err(e);
            }
        };

        log::debug!(
            "[HW] uncached pool: {} pages, bus {:#010x}, virt {:p}",
            pages,
            bus_base,
            virt_base
        );

        Ok(UncachedPool {
            mbox,
            handle,
            bus_base,
            virt_base,
            capacity: pages,
            cursor: 0,
        })
    }

    /// Hand out the next page in the pool.
    ///
    /// # Errors
    ///
    /// [`Error::PoolExhausted`] past the configured capacity; the pool is
    /// sized for the full ring at construction, so hitting this is a
    /// programming error in the caller.
    pub fn acquire(&mut self) -> Result<Page> {
        if self.cursor >= self.capacity {
            return Err(Error::PoolExhausted);
        }
        let offset = self.cursor * PAGE_SIZE;
        self.cursor += 1;
        Ok(Page {
            bus: self.bus_base + offset as u32,
            // SAFETY: offset is within the mapping (cursor < capacity).
            virt: unsafe { self.virt_base.add(offset) },
        })
    }
}

impl Drop for UncachedPool {
    fn drop(&mut self) {
        // SAFETY: virt_base came from a successful mmap of capacity pages.
        unsafe {
            libc::munmap(
                self.virt_base.cast::<libc::c_void>(),
                self.capacity * PAGE_SIZE,
            );
        }
        if let Err(e) = self.mbox.mem_unlock(self.handle) {
            log::warn!("[HW] mailbox unlock failed during teardown: {}", e);
        }
        if let Err(e) = self.mbox.mem_free(self.handle) {
            log::warn!("[HW] mailbox free failed during teardown: {}", e);
        }
    }
}

/// Map a physical range through `/dev/mem`.
fn map_phys(phys: u32, len: usize) -> Result<*mut u8> {
    // SAFETY: valid NUL-terminated path literal; open returns -1 on failure.
    let fd = unsafe {
        libc::open(
            c"/dev/mem".as_ptr(),
            libc::O_RDWR | libc::O_SYNC | libc::O_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(Error::MappingFailed(io::Error::last_os_error()));
    }

    // SAFETY: shared read/write mapping of a page-aligned physical range
    // owned by our locked mailbox allocation; MAP_FAILED checked below.
    let virt = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            phys as libc::off_t,
        )
    };

    // SAFETY: fd is valid; the mapping keeps its own reference.
    unsafe { libc::close(fd) };

    if virt == libc::MAP_FAILED {
        return Err(Error::MappingFailed(io::Error::last_os_error()));
    }
    Ok(virt.cast::<u8>())
}
