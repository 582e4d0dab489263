//! # Process-Wide Map
//!
//! The instance the loader reports randomized regions to while it maps and
//! unmaps libraries. Loading and unloading are serialized by the loader
//! already, the lock here only keeps readers from seeing a half-rotated tree.
//! Lookups share a read lock and run concurrently.
//!
//! Unlike [`RandoMap`], these hooks do not hand fatal errors back: a map that
//! overlaps, misses a region it was told about, or cannot get memory would
//! translate addresses through the wrong region, so the process is aborted.

use log::error;
use spin::{Once, RwLock};

use crate::{Error, RandoMap, Result, Translation, node::RandoFunction};



static MAP: Once<RwLock<RandoMap>> = Once::new();

/// Create the process-wide map. Fails with [`Error::AlreadyInitialized`] if it
/// already exists.
pub fn init() -> Result<()> {
    if MAP.is_completed() {
        return Err(Error::AlreadyInitialized);
    }

    let mut created = false;
    let res = MAP.try_call_once(|| {
        created = true;
        RandoMap::init().map(RwLock::new)
    });
    if let Err(error) = res {
        fatal(&error);
    }

    if !created {
        return Err(Error::AlreadyInitialized);
    }
    Ok(())
}

/// Whether [`init`] has run.
pub fn is_initialized() -> bool {
    MAP.is_completed()
}

/// See [`RandoMap::add`]. Aborts on fatal errors.
pub fn add(
    div_start: usize,
    div_size: usize,
    undiv_start: usize,
    undiv_vaddr: usize,
    funcs: &[RandoFunction],
) -> Result<()> {
    map()
        .write()
        .add(div_start, div_size, undiv_start, undiv_vaddr, funcs)
        .inspect_err(abort_if_fatal)
}

/// See [`RandoMap::delete`]. Aborts if no region starts at `div_start`.
pub fn delete(div_start: usize) -> Result<()> {
    map().write().delete(div_start).inspect_err(abort_if_fatal)
}

/// Run `f` with the region containing `address`.
pub fn find<R>(address: usize, f: impl FnOnce(Option<Translation<'_>>) -> R) -> R {
    f(map().read().find(address))
}

/// Run `f` with the map, if it has been created.
pub fn with_map<R>(f: impl FnOnce(&RandoMap) -> R) -> Option<R> {
    MAP.get().map(|map| f(&map.read()))
}



fn map() -> &'static RwLock<RandoMap> {
    match MAP.get() {
        Some(map) => map,
        None => {
            error!("rando map used before initialization");
            std::process::abort()
        }
    }
}

fn abort_if_fatal(error: &Error) {
    if error.is_fatal() {
        fatal(error);
    }
}

fn fatal(error: &Error) -> ! {
    error!("{error}");
    std::process::abort()
}



#[cfg(test)]
mod tests {
    use super::*;

    // The only test touching the process-wide map, so it owns its state.
    #[test]
    fn process_wide_map() {
        assert!(!is_initialized());
        assert_eq!(with_map(|map| map.len()), None);

        init().unwrap();
        assert!(matches!(init(), Err(Error::AlreadyInitialized)));

        add(0x1000, 0x1000, 0x7000, 0x8000, &[]).unwrap();
        assert_eq!(find(0x1800, |region| region.map(|r| r.undiv_start)), Some(0x7000));
        // Readers do not exclude each other.
        assert_eq!(find(0x1800, |_| with_map(|map| map.len())), Some(1));
        assert!(matches!(add(0x9000, 0, 0, 0, &[]), Err(Error::EmptyInterval { .. })));

        delete(0x1000).unwrap();
        assert!(!find(0x1800, |region| region.is_some()));
        assert_eq!(with_map(|map| map.version()), Some(crate::MAP_VERSION));
    }
}
