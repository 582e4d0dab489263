//! # Errors

use std::io;

use crate::node::NodeHandle;



/// Everything that can go wrong while maintaining a [`RandoMap`](crate::RandoMap).
///
/// Most variants are *fatal*: they mean the map no longer describes the
/// address space correctly (or never will), and continuing would risk
/// translating addresses through the wrong region. See [`Error::is_fatal`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An inserted interval overlaps a resident one.
    #[error(
        "overlapping rando map nodes: [{start:#x}, {end:#x}) overlaps resident \
        [{resident_start:#x}, {resident_end:#x})"
    )]
    Overlap {
        start: usize,
        end: usize,
        resident_start: usize,
        resident_end: usize,
    },

    /// No resident interval starts at the given address.
    #[error("trying to delete inexistent node at {div_start:#x}")]
    NotResident { div_start: usize },

    /// The tree no longer satisfies its ordering or heap invariants.
    #[error("rando map corrupted at {node:?}: {reason}")]
    Corrupted {
        node: NodeHandle,
        reason: &'static str,
    },

    /// The operating system refused to map another arena page.
    #[error("rando map mmap failed")]
    PageMap(#[source] io::Error),

    /// The operating system random source failed.
    #[error("failed to read random bytes")]
    Entropy(#[source] io::Error),

    /// A region with zero length was added.
    #[error("empty region at {div_start:#x}")]
    EmptyInterval { div_start: usize },

    /// `div_start + div_size` does not fit in the address space.
    #[error("region at {div_start:#x} with size {div_size:#x} overflows the address space")]
    AddressOverflow { div_start: usize, div_size: usize },

    /// The process-wide map was initialized twice.
    #[error("rando map already initialized")]
    AlreadyInitialized,
}

impl Error {
    /// Whether this error means the map (or the memory backing it) can no
    /// longer be trusted. Loader hooks abort the process on these.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Overlap { .. }
            | Self::NotResident { .. }
            | Self::Corrupted { .. }
            | Self::PageMap(_)
            | Self::Entropy(_) => true,
            Self::EmptyInterval { .. } | Self::AddressOverflow { .. } | Self::AlreadyInitialized => {
                false
            }
        }
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classes() {
        assert!(Error::NotResident { div_start: 0x1000 }.is_fatal());
        assert!(Error::PageMap(io::Error::from_raw_os_error(libc::ENOMEM)).is_fatal());
        assert!(!Error::EmptyInterval { div_start: 0x1000 }.is_fatal());
        assert!(!Error::AlreadyInitialized.is_fatal());
    }

    #[test]
    fn overlap_message_names_both_regions() {
        let msg = Error::Overlap {
            start: 0x1800,
            end: 0x2800,
            resident_start: 0x1000,
            resident_end: 0x2000,
        }
        .to_string();
        assert!(msg.contains("0x1800"));
        assert!(msg.contains("0x2000"));
    }
}
