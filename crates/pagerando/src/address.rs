//! # Random Addresses
//!
//! Randomized code and the page offset table are placed at uniformly random
//! page-aligned addresses inside a window that is unlikely to collide with
//! the kernel's own `mmap` placement.

use rando_map::{Entropy, page::page_size};

use crate::{Error, Result};



/// A half-open window `[low, high)` of the address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    pub low: usize,
    pub high: usize,
}

impl AddressRange {
    #[cfg(not(target_pointer_width = "64"))]
    pub const DEFAULT: Self = Self::new(0xb000_0000, 0xb600_0000);
    #[cfg(target_pointer_width = "64")]
    pub const DEFAULT: Self = Self::new(0x10_0000_0000, 0x50_0000_0000);

    pub const fn new(low: usize, high: usize) -> Self {
        Self { low, high }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.high.saturating_sub(self.low)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.high <= self.low
    }

    #[inline]
    pub const fn contains(&self, address: usize) -> bool {
        self.low <= address && address < self.high
    }

    /// The number of whole pages of `page_size` bytes in the range, and the
    /// first of them.
    fn pages(&self, page_size: usize) -> Option<(usize, usize)> {
        let first = self.low.checked_next_multiple_of(page_size)?;
        let end = self.high - self.high % page_size;
        let count = end.checked_sub(first)? / page_size;
        (count != 0).then_some((first, count))
    }
}

impl Default for AddressRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}



/// Pick a page-aligned address uniformly at random inside `range`.
///
/// Only pages that fit entirely inside the range are candidates.
pub fn random_address<E: Entropy>(range: AddressRange, mut entropy: E) -> Result<usize> {
    let page_size = page_size();
    let Some((first, count)) = range.pages(page_size) else {
        return Err(Error::EmptyRange {
            low: range.low,
            high: range.high,
        });
    };

    let page = entropy.uniform_usize(count).map_err(Error::Entropy)?;
    Ok(first + page * page_size)
}



#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    struct Fixed(usize);

    impl Entropy for Fixed {
        fn fill(&mut self, buf: &mut [u8]) -> io::Result<()> {
            buf.copy_from_slice(&self.0.to_ne_bytes()[..buf.len()]);
            Ok(())
        }
    }

    #[test]
    fn default_range_is_not_empty() {
        assert!(!AddressRange::DEFAULT.is_empty());
        assert!(AddressRange::DEFAULT.len() > page_size());
    }

    #[test]
    fn pages_ignore_partial_ends() {
        let range = AddressRange::new(0x1001, 0x5fff);
        assert_eq!(range.pages(0x1000), Some((0x2000, 3)));
        assert_eq!(AddressRange::new(0x1001, 0x1fff).pages(0x1000), None);
        assert_eq!(AddressRange::new(0x5000, 0x1000).pages(0x1000), None);
        assert_eq!(AddressRange::new(usize::MAX - 1, usize::MAX).pages(0x1000), None);
    }

    #[test]
    fn picks_the_scripted_page() {
        let size = page_size();
        let range = AddressRange::new(size * 16, size * 32);
        assert_eq!(random_address(range, Fixed(3)).unwrap(), size * 19);
        // Values wrap around the page count.
        assert_eq!(random_address(range, Fixed(16 + 5)).unwrap(), size * 21);
    }

    #[test]
    fn empty_ranges_are_rejected() {
        let err = random_address(AddressRange::new(0x1000, 0x1000), Fixed(0)).unwrap_err();
        assert!(matches!(err, Error::EmptyRange { low: 0x1000, high: 0x1000 }));
    }
}
