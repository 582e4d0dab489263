//! # Errors

use std::{io, path::PathBuf};



#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The POT map file could not be read. Advisory: the next lookup tries
    /// again.
    #[error("error reading pot map file {path:?}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no pot index for {name:?}")]
    UnknownName { name: String },

    /// The range does not contain a single whole page.
    #[error("address range [{low:#x}, {high:#x}) holds no page")]
    EmptyRange { low: usize, high: usize },

    #[error("failed to reserve the page offset table")]
    Reserve(#[source] io::Error),

    #[error("failed to read random bytes")]
    Entropy(#[source] io::Error),
}
