use std::{fs, io, path::PathBuf, process};

use pagerando::*;
use rando_map::{Entropy, OsEntropy, page::page_size};



/// A fixture path unique to this test process.
fn fixture(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pagerando-{}", process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

struct Sequence(usize);

impl Entropy for Sequence {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<()> {
        buf.copy_from_slice(&self.0.to_ne_bytes()[..buf.len()]);
        self.0 += 1;
        Ok(())
    }
}



#[test]
fn pot_map_file_assigns_line_numbers() {
    let path = fixture("names.txt");
    fs::write(&path, "libc.so\nlibm.so\nlibdl.so\n").unwrap();

    let mut map = PotIndexMap::with_path(&path);
    assert!(!map.is_loaded());
    assert_eq!(map.get_index("libm.so").unwrap(), 1);
    assert!(map.is_loaded());
    assert_eq!(map.get_index("libdl.so").unwrap(), 2);
    assert!(matches!(
        map.get_index("libz.so"),
        Err(Error::UnknownName { name }) if name == "libz.so",
    ));

    // The file is only read once.
    fs::write(&path, "libz.so\n").unwrap();
    assert_eq!(map.get_index("libc.so").unwrap(), 0);
    assert!(map.get_index("libz.so").is_err());
}

#[test]
fn unreadable_pot_map_is_retried() {
    let path = fixture("late.txt");
    let _ = fs::remove_file(&path);

    let mut map = PotIndexMap::with_path(&path);
    let err = map.get_index("libc.so").unwrap_err();
    assert!(matches!(err, Error::Unavailable { ref path, .. } if path == map.path()));

    fs::write(&path, "liblog.so\nlibc.so").unwrap();
    assert_eq!(map.get_index("libc.so").unwrap(), 1);
}

#[test]
fn default_map_uses_the_system_path() {
    assert_eq!(PotIndexMap::default().path(), std::path::Path::new(DEFAULT_POT_MAP_PATH));
}

#[test]
fn random_addresses_stay_in_range() {
    let range = AddressRange::DEFAULT;
    for _ in 0..256 {
        let address = random_address(range, OsEntropy).unwrap();
        assert!(range.contains(address), "{address:#x}");
        assert_eq!(address % page_size(), 0);
    }
}

#[test]
fn consecutive_draws_walk_the_pages() {
    let size = page_size();
    let range = AddressRange::new(size, size * 5);
    let mut entropy = Sequence(0);
    let picks: Vec<_> = (0..5)
        .map(|_| random_address(range, &mut entropy).unwrap() / size)
        .collect();
    assert_eq!(picks, [1, 2, 3, 4, 1]);
}

#[test]
fn pot_table_slots_are_word_sized() {
    let table = PotTable::reserve(AddressRange::DEFAULT, OsEntropy).unwrap();
    assert_eq!(table.base() % page_size(), 0);
    let first = table.entry_addr(0).unwrap();
    let second = table.entry_addr(1).unwrap();
    assert_eq!(second - first, size_of::<usize>());
    assert_eq!(pot_base().unwrap(), pot_base().unwrap());
}
