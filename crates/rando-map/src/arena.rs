//! # Node Arena
//!
//! A fixed-size block allocator for map nodes. Nodes are bump-allocated out
//! of [pages](Page) taken directly from the operating system, released nodes
//! go onto a LIFO free list and are handed out again before any new page is
//! mapped. Pages are never returned.

use core::{
    alloc::Layout,
    ops::{Index, IndexMut},
    ptr::NonNull,
};
use std::{ffi::CStr, io};

use log::trace;

use crate::{
    Error, Result,
    node::{Node, NodeHandle},
    page::{Page, page_size},
};



/// What `/proc/<pid>/maps` shows for arena pages.
pub const VMA_NAME: &CStr = c"$$rando_map$$";

#[derive(Debug)]
pub(crate) struct Arena {
    pages: Vec<Page>,
    page_size: usize,
    /// Byte offset of the first node slot in the first page.
    first_offset: usize,
    /// Next unused slot of the last page.
    next: usize,
    /// Slot count of the last page.
    limit: usize,
    free: Option<NodeHandle>,
    free_len: usize,
    live: usize,
}

impl Arena {
    /// Map the first page, reserving room for a `reserve`-shaped record at its
    /// start. Returns the arena and a pointer to the reserved bytes.
    pub fn new(reserve: Layout) -> Result<(Self, NonNull<u8>)> {
        Self::with_page_size(page_size(), reserve)
    }

    /// Like [`Self::new`], with pages of `page_size` bytes instead of the
    /// platform's.
    pub fn with_page_size(page_size: usize, reserve: Layout) -> Result<(Self, NonNull<u8>)> {
        let first_offset = reserve.size().next_multiple_of(align_of::<Node>());
        if reserve.align() > page_size || first_offset + size_of::<Node>() > page_size {
            return Err(Error::PageMap(io::Error::from_raw_os_error(libc::EINVAL)));
        }

        let mut arena = Self {
            pages: Vec::new(),
            page_size,
            first_offset,
            next: 0,
            limit: 0,
            free: None,
            free_len: 0,
            live: 0,
        };
        arena.grow()?;

        if let Err(error) = arena.pages[0].name(VMA_NAME) {
            trace!("could not name rando map page: {error}");
        }

        // SAFETY: `grow` succeeded, so page zero exists and is at least
        // `first_offset` bytes long.
        let reserved = unsafe { NonNull::new_unchecked(arena.pages[0].at(0)) };

        Ok((arena, reserved))
    }

    /// Get a vacant node slot.
    pub fn allocate(&mut self) -> Result<NodeHandle> {
        if let Some(handle) = self.free {
            self.free = self[handle].right.take();
            self.free_len -= 1;
            self.live += 1;
            trace!("reusing node {handle:?}");
            return Ok(handle);
        }

        if self.next >= self.limit {
            self.grow()?;
        }

        let handle = NodeHandle::new(self.pages.len() - 1, self.next);
        self.next += 1;
        self.live += 1;
        // SAFETY: The slot lies within the last page and was never handed out.
        unsafe {
            self.slot_ptr(handle).write(Node::VACANT);
        }

        Ok(handle)
    }

    /// Put a node on the free list.
    ///
    /// The node must already be [cleared](Node::clear) and detached from the
    /// tree.
    pub fn release(&mut self, handle: NodeHandle) {
        debug_assert!(self[handle].is_vacant(), "released node still holds data");

        let free = self.free;
        self[handle].right = free;
        self.free = Some(handle);
        self.free_len += 1;
        self.live -= 1;
    }

    /// The number of pages mapped so far.
    #[inline]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The base address of page `page`, if it has been mapped.
    #[inline]
    pub fn page_addr(&self, page: usize) -> Option<usize> {
        self.pages.get(page).map(Page::addr)
    }

    /// The number of node slots in the mapped pages.
    pub fn capacity(&self) -> usize {
        (0..self.pages.len()).map(|page| self.slots_in(page)).sum()
    }

    /// The number of nodes waiting on the free list.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.free_len
    }

    /// The number of nodes handed out and not yet released.
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    /// How many slots fit into page `page`.
    pub fn slots_in(&self, page: usize) -> usize {
        let offset = if page == 0 { self.first_offset } else { 0 };
        ((self.page_size - offset) / size_of::<Node>()).min(NodeHandle::MAX_SLOTS)
    }
}

// Private.
impl Arena {
    fn grow(&mut self) -> Result<()> {
        if self.pages.len() >= NodeHandle::MAX_PAGES {
            return Err(Error::PageMap(io::Error::from_raw_os_error(libc::ENOMEM)));
        }

        let page = Page::map(self.page_size).map_err(Error::PageMap)?;
        trace!(
            "mapped rando map page {} at {:#x}",
            self.pages.len(),
            page.addr()
        );
        self.pages.push(page);
        self.next = 0;
        self.limit = self.slots_in(self.pages.len() - 1);

        Ok(())
    }

    fn slot_ptr(&self, handle: NodeHandle) -> *mut Node {
        let (page, slot) = (handle.page(), handle.slot());
        assert!(
            page < self.pages.len() && slot < self.slots_in(page),
            "{handle:?} does not belong to this arena",
        );
        let offset = if page == 0 { self.first_offset } else { 0 };
        // SAFETY: The assert above keeps the slot inside the page.
        unsafe { self.pages[page].at(offset + slot * size_of::<Node>()) as *mut Node }
    }

    /// Whether `handle` points at a slot that has been written at least once.
    fn initialized(&self, handle: NodeHandle) -> bool {
        let last = self.pages.len() - 1;
        handle.page() < last || (handle.page() == last && handle.slot() < self.next)
    }
}

impl Index<NodeHandle> for Arena {
    type Output = Node;

    fn index(&self, handle: NodeHandle) -> &Node {
        debug_assert!(self.initialized(handle));
        // SAFETY: Every slot up to the bump cursor holds an initialized node,
        // and `&self` keeps anyone from mutating it.
        unsafe { &*self.slot_ptr(handle) }
    }
}

impl IndexMut<NodeHandle> for Arena {
    fn index_mut(&mut self, handle: NodeHandle) -> &mut Node {
        debug_assert!(self.initialized(handle));
        // SAFETY: See `index`, `&mut self` makes the access unique.
        unsafe { &mut *self.slot_ptr(handle) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // The pages stay mapped, but the function tables are owned by the
        // global allocator and have to go back to it.
        for page in 0..self.pages.len() {
            let used = if page + 1 == self.pages.len() {
                self.next
            } else {
                self.slots_in(page)
            };
            for slot in 0..used {
                let handle = NodeHandle::new(page, slot);
                self[handle].funcs = None;
            }
        }
    }
}
