// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! VideoCore property mailbox.
//!
//! The firmware owns physical memory management on these boards; user space
//! asks for contiguous uncached RAM through the property channel of the
//! `/dev/vcio` character device. A property message is a 32-bit word
//! buffer: total size, request code, then one tag (`id`, buffer length,
//! request length, payload...) and a zero end tag. The firmware overwrites
//! the payload in place and flips the code word to `0x8000_0000` on
//! success.
//!
//! Only the four memory tags this crate needs are wrapped here.

use std::io;
use std::mem;

use crate::{Error, Result};

/// Property tag: allocate contiguous memory (size, alignment, flags).
const TAG_ALLOCATE_MEMORY: u32 = 0x0003_000C;
/// Property tag: lock memory in place, returning its bus address.
const TAG_LOCK_MEMORY: u32 = 0x0003_000D;
/// Property tag: unlock memory.
const TAG_UNLOCK_MEMORY: u32 = 0x0003_000E;
/// Property tag: release memory.
const TAG_RELEASE_MEMORY: u32 = 0x0003_000F;

/// Process-request code.
const CODE_REQUEST: u32 = 0;
/// Firmware response code for a fully parsed request.
const CODE_RESPONSE_OK: u32 = 0x8000_0000;

/// `_IOWR(100, 0, char *)`: the property-channel ioctl of `/dev/vcio`.
///
/// Computed rather than hardcoded because the encoded pointer size differs
/// between 32- and 64-bit userlands.
const IOCTL_MBOX_PROPERTY: libc::c_ulong = {
    const IOC_WRITE_READ: libc::c_ulong = 3;
    const MAJOR_NUM: libc::c_ulong = 100;
    (IOC_WRITE_READ << 30) | ((mem::size_of::<*mut libc::c_void>() as libc::c_ulong) << 16)
        | (MAJOR_NUM << 8)
};

/// Open handle to the firmware property channel.
pub struct Mailbox {
    fd: libc::c_int,
}

impl Mailbox {
    /// Open `/dev/vcio`.
    ///
    /// # Errors
    ///
    /// [`Error::MailboxFailed`] when the device is missing or inaccessible
    /// (needs root). Fatal for the caller.
    pub fn open() -> Result<Mailbox> {
        // SAFETY: valid NUL-terminated path literal; open returns -1 on
        // failure (checked below).
        let fd = unsafe { libc::open(c"/dev/vcio".as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(Error::MailboxFailed(format!(
                "open /dev/vcio: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(Mailbox { fd })
    }

    /// Run one single-tag property call, returning the first response word.
    fn property(&self, tag: u32, args: &[u32]) -> Result<u32> {
        // size, code, tag, buf_len, req_len, payload..., end tag
        let mut msg = [0u32; 16];
        let payload = args.len().max(1);
        assert!(payload <= 10, "property payload too large");

        msg[0] = ((6 + payload) * 4) as u32;
        msg[1] = CODE_REQUEST;
        msg[2] = tag;
        msg[3] = (payload * 4) as u32;
        msg[4] = (args.len() * 4) as u32;
        msg[5..5 + args.len()].copy_from_slice(args);
        msg[5 + payload] = 0; // end tag

        // SAFETY: fd is a valid /dev/vcio descriptor and msg is a properly
        // framed property buffer that outlives the call; the driver reads
        // and rewrites it in place.
        let ret = unsafe { libc::ioctl(self.fd, IOCTL_MBOX_PROPERTY, msg.as_mut_ptr()) };
        if ret < 0 {
            return Err(Error::MailboxFailed(format!(
                "property ioctl (tag {:#010x}): {}",
                tag,
                io::Error::last_os_error()
            )));
        }
        if msg[1] != CODE_RESPONSE_OK {
            return Err(Error::MailboxFailed(format!(
                "property tag {:#010x} rejected (code {:#010x})",
                tag, msg[1]
            )));
        }
        Ok(msg[5])
    }

    /// Allocate `size` bytes of contiguous memory.
    ///
    /// Returns the firmware handle; the block is unusable until locked.
    pub fn mem_alloc(&self, size: u32, align: u32, flags: u32) -> Result<u32> {
        match self.property(TAG_ALLOCATE_MEMORY, &[size, align, flags])? {
            0 => Err(Error::MailboxFailed(format!(
                "firmware refused allocation of {} bytes",
                size
            ))),
            handle => Ok(handle),
        }
    }

    /// Lock an allocation in place and return its bus address.
    pub fn mem_lock(&self, handle: u32) -> Result<u32> {
        match self.property(TAG_LOCK_MEMORY, &[handle])? {
            0 => Err(Error::MailboxFailed(format!(
                "firmware refused to lock handle {:#x}",
                handle
            ))),
            bus_addr => Ok(bus_addr),
        }
    }

    /// Unlock a previously locked allocation.
    pub fn mem_unlock(&self, handle: u32) -> Result<()> {
        self.property(TAG_UNLOCK_MEMORY, &[handle]).map(|_| ())
    }

    /// Release an allocation back to the firmware.
    pub fn mem_free(&self, handle: u32) -> Result<()> {
        self.property(TAG_RELEASE_MEMORY, &[handle]).map(|_| ())
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        // SAFETY: fd is valid and closed exactly once.
        unsafe {
            libc::close(self.fd);
        }
    }
}
