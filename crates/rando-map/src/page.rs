//! # Arena Pages
//!
//! Raw storage for the node arena, obtained straight from the operating
//! system so that the map never depends on the global allocator for its
//! records.

use std::{
    ffi::{CStr, c_int, c_ulong},
    io,
    ptr::NonNull,
};



const PR_SET_VMA: c_int = 0x53564d41;
const PR_SET_VMA_ANON_NAME: c_ulong = 0;

/// Used when `sysconf` cannot tell us the page size.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// The size of a page on this platform.
pub fn page_size() -> usize {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res <= 0 {
        FALLBACK_PAGE_SIZE
    } else {
        res as usize
    }
}



/// A private, anonymous mapping: read/write storage from [`Page::map`], or
/// inaccessible address space from [`Page::reserve`].
///
/// There is intentionally no `Drop` implementation: pages handed to the arena
/// stay mapped for the life of the process, so a handle that outlives its
/// map can never point at unmapped memory.
#[derive(Debug)]
pub struct Page {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: A `Page` is only a pointer to memory nobody else owns, access goes
// through the arena which follows the usual `&`/`&mut` rules.
unsafe impl Send for Page {}
unsafe impl Sync for Page {}

impl Page {
    /// Map a new zero-filled page of `len` bytes.
    pub fn map(len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        let res = unsafe {
            libc::mmap(
                core::ptr::null_mut(), // Let the kernel pick the address.
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1, // File descriptor is ignored for anonymous mappings.
                0,
            )
        };
        if res == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        // Anonymous mappings are zero-filled by the kernel.
        let ptr = NonNull::new(res as *mut u8)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EFAULT))?;

        Ok(Self { ptr, len })
    }

    /// Reserve `len` bytes of inaccessible address space, preferably at
    /// `hint`. The kernel is free to place the reservation elsewhere.
    pub fn reserve(hint: usize, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        let res = unsafe {
            libc::mmap(
                hint as *mut libc::c_void,
                len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if res == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(res as *mut u8)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EFAULT))?;

        Ok(Self { ptr, len })
    }

    /// Give the mapping a name visible in `/proc/<pid>/maps`.
    ///
    /// Only supported on kernels built with `CONFIG_ANON_VMA_NAME`; the error
    /// is returned for the caller to log, it never affects the mapping itself.
    pub fn name(&self, label: &CStr) -> io::Result<()> {
        let res = unsafe {
            libc::prctl(
                PR_SET_VMA,
                PR_SET_VMA_ANON_NAME,
                self.addr() as c_ulong,
                self.len as c_ulong,
                label.as_ptr(),
            )
        };
        if res == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Get the numeric address of the first byte of the page.
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Get a raw pointer to the byte at `offset`.
    ///
    /// # Safety
    ///
    /// `offset` must be less than [`Self::len`].
    #[inline]
    pub unsafe fn at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset < self.len, "offset is outside of the page");
        unsafe { self.ptr.as_ptr().add(offset) }
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        assert!(page_size().is_power_of_two());
    }

    #[test]
    fn fresh_pages_are_zeroed() {
        let page = Page::map(page_size()).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(page.at(0), page.len()) };
        assert!(bytes.iter().all(|b| *b == 0));
        assert_eq!(page.addr() % page_size(), 0);
    }

    #[test]
    fn reservations_are_page_aligned() {
        let size = page_size();
        let page = Page::reserve(0, size * 4).unwrap();
        assert_eq!(page.addr() % size, 0);
        assert_eq!(page.len(), size * 4);
    }

    #[test]
    fn empty_pages_are_rejected() {
        let err = Page::map(0).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }
}
