//! # Rando Map
//!
//! Bookkeeping for pagerando-style code randomization: after the loader has
//! shuffled the functions of a library into a new layout, the map translates
//! any address inside a randomized region back to the original image, so
//! unwinders, symbolizers and exception handling keep working.
//!
//! The map is a [treap] over disjoint address intervals whose nodes live in
//! pages mapped straight from the operating system.
//!
//! ```no_run
//! use rando_map::{RandoFunction, RandoMap};
//!
//! let mut map = RandoMap::init()?;
//! let funcs = [RandoFunction { div_offset: 0, undiv_offset: 0x40, size: 0x40 }];
//! map.add(0x1000, 0x1000, 0x7000, 0x8000, &funcs)?;
//!
//! let region = map.find(0x1010).unwrap();
//! assert_eq!(region.original_address(0x1010), Some(0x7050));
//! # Ok::<(), rando_map::Error>(())
//! ```
//!
//! [treap]: https://en.wikipedia.org/wiki/Treap

mod arena;
pub mod entropy;
mod error;
pub mod global;
mod map;
mod node;
pub mod page;
mod treap;



pub use arena::VMA_NAME;
pub use entropy::{Entropy, OsEntropy};
pub use error::Error;
pub use map::{ArenaStats, Header, MAP_VERSION, RandoMap, Translation};
pub use node::{NodeHandle, RandoFunction};

pub type Result<T> = core::result::Result<T, error::Error>;
