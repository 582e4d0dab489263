//! # POT Index Map
//!
//! Which page offset table slot a library owns. The assignment is a plain
//! text file with one library name per line, the line number being the
//! index. It is read the first time a name is looked up.

use std::{
    fs,
    path::{Path, PathBuf},
};

use hashbrown::HashMap;
use log::{trace, warn};
use spin::Mutex;

use crate::{Error, Result};



pub const DEFAULT_POT_MAP_PATH: &str = "/system/etc/ld.pot_map.txt";

static POT_MAP: Mutex<Option<PotIndexMap>> = Mutex::new(None);

/// Look `name` up in the process-wide map read from [`DEFAULT_POT_MAP_PATH`].
pub fn get_pot_index(name: &str) -> Result<usize> {
    POT_MAP
        .lock()
        .get_or_insert_with(PotIndexMap::default)
        .get_index(name)
}



#[derive(Debug)]
pub struct PotIndexMap {
    path: PathBuf,
    indices: Option<HashMap<String, usize>>,
}

impl Default for PotIndexMap {
    fn default() -> Self {
        Self::with_path(DEFAULT_POT_MAP_PATH)
    }
}

impl PotIndexMap {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            indices: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has been read successfully.
    pub fn is_loaded(&self) -> bool {
        self.indices.is_some()
    }

    /// The POT index assigned to `name`.
    ///
    /// Reads the file if that has not succeeded yet. A read failure is
    /// returned as [`Error::Unavailable`] and leaves the map unloaded.
    pub fn get_index(&mut self, name: &str) -> Result<usize> {
        let indices = match &mut self.indices {
            Some(indices) => indices,
            empty => empty.insert(read_pot_map(&self.path)?),
        };

        indices.get(name).copied().ok_or_else(|| Error::UnknownName {
            name: name.to_string(),
        })
    }
}

fn read_pot_map(path: &Path) -> Result<HashMap<String, usize>> {
    let content = fs::read_to_string(path).map_err(|source| {
        warn!("error reading pot map file {path:?}: {source}");
        Error::Unavailable {
            path: path.to_path_buf(),
            source,
        }
    })?;

    Ok(parse(&content))
}

/// Assign every line its zero-based line number. Later duplicates win, and
/// the empty remainder after a final newline is not a line.
fn parse(content: &str) -> HashMap<String, usize> {
    let content = content.strip_suffix('\n').unwrap_or(content);
    let mut indices = HashMap::new();
    for (index, line) in content.split('\n').enumerate() {
        trace!("assigning {line:?} to index {index}");
        indices.insert(line.to_string(), index);
    }

    indices
}
