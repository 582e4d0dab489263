//! # Rando Map
//!
//! See [`RandoMap`].

use core::{alloc::Layout, fmt, ptr::NonNull};

use log::debug;

use crate::{
    Error, Result,
    arena::Arena,
    entropy::{Entropy, OsEntropy},
    node::{Node, NodeHandle, RandoFunction},
    treap,
};



/// Layout version of [`Header`] and the node records. Bump this whenever
/// either changes, external readers check it before looking any further.
pub const MAP_VERSION: usize = 1;

/// The fixed entry point of a map, stored at the very start of its first
/// arena page.
///
/// `root` is a page and slot pair, not an address. The page base addresses
/// are kept in the map's own heap memory, so a reader outside the process
/// can check `version` and whether the map is empty, but needs
/// [`RandoMap::page_addr`] to follow `root` to a node.
#[derive(Debug)]
#[repr(C)]
pub struct Header {
    pub version: usize,
    pub root: Option<NodeHandle>,
}

/// Maps addresses inside randomized code regions back to where the code
/// lives in the original, un-randomized image.
///
/// Regions are disjoint half-open intervals `[div_start, div_end)` kept in a
/// treap. Node storage comes from pages mapped directly from
/// the operating system; those pages stay mapped even after the map is
/// dropped.
///
/// Mutation takes `&mut self` and lookups take `&self`. The map does no
/// locking of its own.
pub struct RandoMap<E = OsEntropy> {
    header: NonNull<Header>,
    arena: Arena,
    entropy: E,
}

// SAFETY: `header` points into the arena's first page, which is owned by the
// map alone and never unmapped.
unsafe impl<E: Send> Send for RandoMap<E> {}
unsafe impl<E: Sync> Sync for RandoMap<E> {}

/// Where an address inside a randomized region came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Translation<'map> {
    pub div_start: usize,
    pub div_end: usize,
    pub undiv_start: usize,
    pub undiv_vaddr: usize,
    funcs: &'map [RandoFunction],
}

/// Memory usage of a map's node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaStats {
    pub pages: usize,
    pub page_size: usize,
    /// Node slots in all mapped pages.
    pub capacity: usize,
    /// Nodes holding a region.
    pub live: usize,
    /// Nodes waiting for reuse.
    pub free: usize,
}



impl RandoMap<OsEntropy> {
    /// Create an empty map, drawing node priorities from the kernel.
    pub fn init() -> Result<Self> {
        Self::with_entropy(OsEntropy)
    }
}

impl<E: Entropy> RandoMap<E> {
    /// Create an empty map, drawing node priorities from `entropy`.
    pub fn with_entropy(entropy: E) -> Result<Self> {
        let (arena, reserved) = Arena::new(Layout::new::<Header>())?;
        let header = reserved.cast::<Header>();
        // SAFETY: The arena reserved (page aligned) room for a header at the
        // start of its first page and never hands those bytes out as nodes.
        unsafe {
            header.write(Header {
                version: MAP_VERSION,
                root: None,
            });
        }
        debug!("rando map header at {:#x}", header.as_ptr() as usize);

        Ok(Self {
            header,
            arena,
            entropy,
        })
    }

    /// Record that `[div_start, div_start + div_size)` holds code originally
    /// at `undiv_start`, from an image meant to be loaded at `undiv_vaddr`.
    ///
    /// `funcs` is copied into the map. Fails with [`Error::Overlap`] if the
    /// region intersects one already present; the map is left unchanged on
    /// every error.
    pub fn add(
        &mut self,
        div_start: usize,
        div_size: usize,
        undiv_start: usize,
        undiv_vaddr: usize,
        funcs: &[RandoFunction],
    ) -> Result<()> {
        if div_size == 0 {
            return Err(Error::EmptyInterval { div_start });
        }
        let div_end = div_start
            .checked_add(div_size)
            .ok_or(Error::AddressOverflow {
                div_start,
                div_size,
            })?;

        let root = self.header().root;
        if let Some(resident) = treap::find_overlap(&self.arena, root, div_start, div_end) {
            return Err(Error::Overlap {
                start: div_start,
                end: div_end,
                resident_start: self.arena[resident].div_start,
                resident_end: self.arena[resident].div_end,
            });
        }

        let prio = self
            .entropy
            .uniform_u32(u32::MAX)
            .map_err(Error::Entropy)?;
        let handle = self.arena.allocate()?;
        self.arena[handle] = Node {
            div_start,
            div_end,
            undiv_start,
            undiv_vaddr,
            funcs: (!funcs.is_empty()).then(|| funcs.into()),
            left: None,
            right: None,
            prio,
        };

        match treap::insert(&mut self.arena, root, handle) {
            Ok(root) => self.header_mut().root = Some(root),
            Err(error) => {
                self.arena[handle].clear();
                self.arena.release(handle);
                return Err(error);
            }
        }

        debug!(
            "added [{div_start:#x}, {div_end:#x}) -> {undiv_start:#x} ({} functions)",
            funcs.len(),
        );
        Ok(())
    }

    /// Forget the region starting at exactly `div_start`.
    pub fn delete(&mut self, div_start: usize) -> Result<()> {
        let root = self.header().root;
        let (root, handle) = treap::remove(&mut self.arena, root, div_start)?;
        self.header_mut().root = root;

        self.arena[handle].clear();
        self.arena.release(handle);

        debug!("deleted region at {div_start:#x}");
        Ok(())
    }
}

impl<E> RandoMap<E> {
    /// The region containing `address`, if any.
    pub fn find(&self, address: usize) -> Option<Translation<'_>> {
        treap::find(&self.arena, self.header().root, address).map(|node| self.translation(node))
    }

    /// All regions, by ascending address.
    pub fn regions(&self) -> impl Iterator<Item = Translation<'_>> + '_ {
        treap::InOrder::new(&self.arena, self.header().root).map(|node| self.translation(node))
    }

    /// The number of regions in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.arena.live()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header().root.is_none()
    }

    #[inline]
    pub fn version(&self) -> usize {
        self.header().version
    }

    /// The address of the [`Header`], for tools that inspect the map from
    /// outside the process.
    #[inline]
    pub fn header_addr(&self) -> usize {
        self.header.as_ptr() as usize
    }

    /// The base address of arena page `page`, for resolving the page part of
    /// a [`NodeHandle`] such as [`Header::root`].
    #[inline]
    pub fn page_addr(&self, page: usize) -> Option<usize> {
        self.arena.page_addr(page)
    }

    /// The number of nodes on the longest path from the root.
    pub fn height(&self) -> usize {
        treap::height(&self.arena, self.header().root)
    }

    /// Walk the whole tree and check its invariants.
    pub fn validate(&self) -> Result<()> {
        let count = treap::validate(&self.arena, self.header().root)?;
        debug_assert_eq!(count, self.len());
        Ok(())
    }

    pub fn arena_stats(&self) -> ArenaStats {
        ArenaStats {
            pages: self.arena.page_count(),
            page_size: self.arena.page_size(),
            capacity: self.arena.capacity(),
            live: self.arena.live(),
            free: self.arena.free_len(),
        }
    }
}

// Private.
impl<E> RandoMap<E> {
    #[inline]
    fn header(&self) -> &Header {
        // SAFETY: Written in `with_entropy`, stays mapped for the life of the
        // process.
        unsafe { self.header.as_ref() }
    }

    #[inline]
    fn header_mut(&mut self) -> &mut Header {
        // SAFETY: See `header`, `&mut self` makes the access unique.
        unsafe { self.header.as_mut() }
    }

    fn translation(&self, handle: NodeHandle) -> Translation<'_> {
        let node = &self.arena[handle];
        Translation {
            div_start: node.div_start,
            div_end: node.div_end,
            undiv_start: node.undiv_start,
            undiv_vaddr: node.undiv_vaddr,
            funcs: node.funcs(),
        }
    }
}

impl<E> fmt::Debug for RandoMap<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandoMap")
            .field("version", &self.version())
            .field("regions", &self.regions().collect::<Vec<_>>())
            .finish()
    }
}



impl<'map> Translation<'map> {
    /// The per-function records of this region.
    #[inline]
    pub fn funcs(&self) -> &'map [RandoFunction] {
        self.funcs
    }

    #[inline]
    pub fn contains(&self, address: usize) -> bool {
        address >= self.div_start && address < self.div_end
    }

    /// The function record covering `address`.
    pub fn function(&self, address: usize) -> Option<&'map RandoFunction> {
        if !self.contains(address) {
            return None;
        }
        let offset = address - self.div_start;
        self.funcs.iter().find(|func| func.contains(offset))
    }

    /// Where the byte at `address` lives in the original image.
    ///
    /// Goes through the function record covering `address` if there is one,
    /// otherwise the region is treated as moved in one piece. `None` if the
    /// result does not fit in the address space.
    pub fn original_address(&self, address: usize) -> Option<usize> {
        if !self.contains(address) {
            return None;
        }
        let offset = address - self.div_start;
        let undiv_offset = match self.function(address) {
            Some(func) => func.undiv_offset.checked_add(offset - func.div_offset)?,
            None => offset,
        };
        self.undiv_start.checked_add(undiv_offset)
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::testing::Scripted;

    fn funcs(count: usize) -> Vec<RandoFunction> {
        (0..count)
            .map(|i| RandoFunction {
                div_offset: i * 0x100,
                undiv_offset: (count - 1 - i) * 0x100,
                size: 0x100,
            })
            .collect()
    }

    #[test]
    fn header_is_at_the_start_of_the_first_page() {
        let map = RandoMap::init().unwrap();
        assert_eq!(map.version(), MAP_VERSION);
        assert_eq!(map.header_addr() % crate::page::page_size(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn translation_goes_through_function_records() {
        let mut map = RandoMap::init().unwrap();
        map.add(0x1000, 0x300, 0x7000, 0x8000, &funcs(3)).unwrap();

        let region = map.find(0x1150).unwrap();
        assert_eq!(region.function(0x1150).unwrap().div_offset, 0x100);
        // Function 1 of 3 stays in the middle.
        assert_eq!(region.original_address(0x1150), Some(0x7150));
        // Function 0 moved to the end.
        assert_eq!(region.original_address(0x1010), Some(0x7210));
        assert_eq!(region.original_address(0x0fff), None);
    }

    #[test]
    fn translations_past_the_address_space_are_none() {
        let mut map = RandoMap::init().unwrap();
        map.add(0x1000, 0x1000, usize::MAX - 0x10, 0, &[]).unwrap();
        let region = map.find(0x1800).unwrap();
        assert_eq!(region.original_address(0x1800), None);
        assert_eq!(region.original_address(0x1008), Some(usize::MAX - 0x8));

        let far = RandoFunction {
            div_offset: 0,
            undiv_offset: usize::MAX,
            size: 0x100,
        };
        map.add(0x4000, 0x1000, 0, 0, &[far]).unwrap();
        let region = map.find(0x4010).unwrap();
        assert_eq!(region.original_address(0x4010), None);
        assert_eq!(region.original_address(0x4000), Some(usize::MAX));
    }

    #[test]
    fn regions_without_records_move_in_one_piece() {
        let mut map = RandoMap::init().unwrap();
        map.add(0x4000, 0x1000, 0x9000, 0xa000, &[]).unwrap();
        let region = map.find(0x4abc).unwrap();
        assert!(region.funcs().is_empty());
        assert_eq!(region.original_address(0x4abc), Some(0x9abc));
    }

    #[test]
    fn rejected_adds_do_not_touch_the_arena() {
        let mut map = RandoMap::init().unwrap();
        map.add(0x1000, 0x1000, 0, 0, &[]).unwrap();
        let before = map.arena_stats();

        assert!(matches!(map.add(0x1800, 0x10, 0, 0, &[]), Err(Error::Overlap { .. })));
        assert!(matches!(map.add(0x5000, 0, 0, 0, &[]), Err(Error::EmptyInterval { .. })));
        assert!(matches!(
            map.add(usize::MAX - 4, 0x10, 0, 0, &[]),
            Err(Error::AddressOverflow { .. })
        ));

        assert_eq!(map.arena_stats(), before);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn scripted_priorities_decide_the_root() {
        // The second region gets the larger priority and must become the root.
        let mut map = RandoMap::with_entropy(Scripted::new([100, 200])).unwrap();
        map.add(0x1000, 0x1000, 0, 0, &[]).unwrap();
        map.add(0x3000, 0x1000, 0, 0, &[]).unwrap();

        let root = map.header().root.unwrap();
        assert_eq!(map.arena[root].div_start, 0x3000);
        assert_eq!(map.arena[root].prio, 200);
        map.validate().unwrap();
    }

    #[test]
    fn deleted_nodes_are_wiped_before_reuse() {
        let mut map = RandoMap::init().unwrap();
        map.add(0x1000, 0x1000, 0x7000, 0x8000, &funcs(2)).unwrap();
        map.add(0x3000, 0x1000, 0x9000, 0xa000, &funcs(1)).unwrap();

        let victim = treap::find(&map.arena, map.header().root, 0x1000).unwrap();
        map.delete(0x1000).unwrap();
        assert!(map.arena[victim].funcs.is_none());
        assert_eq!(map.arena[victim].div_start, 0);
        assert_eq!(map.arena_stats().free, 1);

        map.add(0x1000, 0x800, 0x5000, 0x6000, &[]).unwrap();
        let reused = treap::find(&map.arena, map.header().root, 0x1000).unwrap();
        assert_eq!(reused, victim);
        assert!(map.find(0x1000).unwrap().funcs().is_empty());
        assert_eq!(map.find(0x1800), None);
    }

    #[test]
    fn debug_lists_regions() {
        let mut map = RandoMap::init().unwrap();
        map.add(0x1000, 0x1000, 0x7000, 0x8000, &[]).unwrap();
        let text = format!("{map:?}");
        assert!(text.contains("div_start: 4096"));
    }
}
