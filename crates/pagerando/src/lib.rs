//! # Pagerando
//!
//! The loader-side collaborators of the rando map: where randomized code and
//! the page offset table (POT) go in the address space, and which POT slot a
//! library owns.

pub mod address;
mod error;
pub mod pot;
pub mod pot_index;



pub use address::{AddressRange, random_address};
pub use error::Error;
pub use pot::{POT_ENTRIES, POT_SIZE, PotTable, pot_base};
pub use pot_index::{DEFAULT_POT_MAP_PATH, PotIndexMap, get_pot_index};

pub type Result<T> = core::result::Result<T, Error>;
