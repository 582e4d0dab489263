//! # Page Offset Table
//!
//! Randomized code reaches the pages of its own library through a table of
//! page addresses, one slot per library. The table's address space is
//! reserved once per process at a random address and stays inaccessible
//! until the loader fills the slots it hands out.

use log::debug;
use rando_map::{Entropy, OsEntropy, page::Page};
use spin::Once;

use crate::{AddressRange, Error, Result, random_address};



/// Number of library slots in the table.
pub const POT_ENTRIES: usize = 1024;
/// Bytes of address space reserved for the table.
pub const POT_SIZE: usize = POT_ENTRIES * size_of::<usize>();

static POT: Once<PotTable> = Once::new();

/// The base address of the process-wide table, reserving it on first use.
///
/// A failed reservation is not remembered, the next call tries again.
pub fn pot_base() -> Result<usize> {
    POT.try_call_once(|| PotTable::reserve(AddressRange::DEFAULT, OsEntropy))
        .map(PotTable::base)
}



#[derive(Debug)]
pub struct PotTable {
    page: Page,
}

impl PotTable {
    /// Reserve [`POT_SIZE`] bytes of inaccessible memory at a random address
    /// inside `range`. The kernel may move the reservation if the address
    /// is taken.
    pub fn reserve<E: Entropy>(range: AddressRange, entropy: E) -> Result<Self> {
        let hint = random_address(range, entropy)?;
        let page = Page::reserve(hint, POT_SIZE).map_err(Error::Reserve)?;
        if page.addr() != hint {
            debug!("pot table wanted {hint:#x}, got {:#x}", page.addr());
        }
        debug!("reserved pot table at {:#x}", page.addr());

        Ok(Self { page })
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.page.addr()
    }

    /// Address of the slot for the library with POT index `index`.
    pub fn entry_addr(&self, index: usize) -> Option<usize> {
        (index < POT_ENTRIES).then(|| self.base() + index * size_of::<usize>())
    }
}



#[cfg(test)]
mod tests {
    use rando_map::page::page_size;

    use super::*;

    #[test]
    fn table_covers_every_entry() {
        let table = PotTable::reserve(AddressRange::DEFAULT, OsEntropy).unwrap();
        assert_eq!(table.base() % page_size(), 0);
        assert_eq!(table.entry_addr(0), Some(table.base()));
        assert_eq!(
            table.entry_addr(POT_ENTRIES - 1),
            Some(table.base() + POT_SIZE - size_of::<usize>()),
        );
        assert_eq!(table.entry_addr(POT_ENTRIES), None);
    }

    #[test]
    fn process_table_is_reserved_once() {
        let base = pot_base().unwrap();
        assert_ne!(base, 0);
        assert_eq!(pot_base().unwrap(), base);
    }
}
