//! # Map Nodes

use core::{fmt, num::NonZeroU32};



/// Where one function of a randomized region ended up.
///
/// Offsets are relative to the region's start in the randomized
/// (`div_offset`) and original (`undiv_offset`) layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct RandoFunction {
    pub div_offset: usize,
    pub undiv_offset: usize,
    pub size: usize,
}

impl RandoFunction {
    /// Whether `offset` (relative to the randomized region) falls inside this
    /// function.
    #[inline]
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.div_offset && offset - self.div_offset < self.size
    }
}



/// A stable reference to a node slot in the arena.
///
/// Encodes the page index in the upper and the slot index in the lower 16
/// bits, offset by one so `Option<NodeHandle>` stays four bytes wide.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NodeHandle(NonZeroU32);

impl NodeHandle {
    pub(crate) const SLOT_BITS: u32 = 16;
    pub(crate) const MAX_SLOTS: usize = 1 << Self::SLOT_BITS;
    /// The last page index is unusable, its final slot would wrap to zero.
    pub(crate) const MAX_PAGES: usize = (u32::MAX >> Self::SLOT_BITS) as usize;

    pub(crate) fn new(page: usize, slot: usize) -> Self {
        debug_assert!(page < Self::MAX_PAGES);
        debug_assert!(slot < Self::MAX_SLOTS);
        let raw = ((page as u32) << Self::SLOT_BITS | slot as u32) + 1;
        // SAFETY: `raw` is at least one and cannot wrap, see the asserts above.
        Self(unsafe { NonZeroU32::new_unchecked(raw) })
    }

    #[inline]
    pub fn page(self) -> usize {
        ((self.0.get() - 1) >> Self::SLOT_BITS) as usize
    }

    #[inline]
    pub fn slot(self) -> usize {
        ((self.0.get() - 1) & (Self::MAX_SLOTS as u32 - 1)) as usize
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHandle({}:{})", self.page(), self.slot())
    }
}



/// One randomized region, stored in arena pages.
///
/// Slots are written as [`Node::VACANT`] when the arena first hands them out,
/// and return to that state before they are recycled.
#[derive(Debug)]
#[repr(C)]
pub(crate) struct Node {
    pub div_start: usize,
    pub div_end: usize,
    pub undiv_start: usize,
    pub undiv_vaddr: usize,
    pub funcs: Option<Box<[RandoFunction]>>,
    pub left: Option<NodeHandle>,
    /// Doubles as the free list link while the node is not in the tree.
    pub right: Option<NodeHandle>,
    pub prio: u32,
}

impl Node {
    /// The lowest possible priority, given to nodes about to leave the tree.
    pub const MIN_PRIO: u32 = 0;

    pub const VACANT: Self = Self {
        div_start: 0,
        div_end: 0,
        undiv_start: 0,
        undiv_vaddr: 0,
        funcs: None,
        left: None,
        right: None,
        prio: Self::MIN_PRIO,
    };

    /// Drop everything this node describes, leaving it [vacant](Self::VACANT).
    pub fn clear(&mut self) {
        *self = Self::VACANT;
    }

    pub fn is_vacant(&self) -> bool {
        self.div_start == 0
            && self.div_end == 0
            && self.undiv_start == 0
            && self.undiv_vaddr == 0
            && self.funcs.is_none()
            && self.left.is_none()
            && self.prio == Self::MIN_PRIO
    }

    #[inline]
    pub fn funcs(&self) -> &[RandoFunction] {
        self.funcs.as_deref().unwrap_or_default()
    }
}
