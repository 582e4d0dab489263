//! # Rando Tool
//!
//! Drives the rando map and its collaborators from the command line.

pub mod log;
pub mod script;

use std::fs;

use ::log::{debug, info};
use anyhow::{Context as _, Result, bail};
use pagerando::{AddressRange, PotIndexMap};
use rando_map::{OsEntropy, RandoMap};



const USAGE: &str = "\
usage: randotool [--stderr] <command>

commands:
    index <pot-map> <name>          print the POT index of a library
    random-address [<low> <high>]   pick a random page-aligned address
    pot-base                        reserve the page offset table
    replay <script>                 run a region script against a new map

RANDO_LOG sets the log filter, e.g. `info,rando_map=trace`.";

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1).peekable();

    let use_stderr = args.next_if(|arg| arg == "--stderr").is_some();
    let filter = std::env::var("RANDO_LOG").unwrap_or_default();
    log::Logger {
        use_stderr,
        ..Default::default()
    }
    .with_filter(&filter)?
    .init()?;

    let Some(command) = args.next() else {
        bail!("no command provided\n\n{USAGE}");
    };
    let args: Vec<String> = args.collect();
    debug!("running {command} {args:?}");

    match (command.as_str(), args.as_slice()) {
        ("index", [path, name]) => {
            let index = PotIndexMap::with_path(path).get_index(name)?;
            println!("{index}");
        }
        ("random-address", []) => random_address(AddressRange::DEFAULT)?,
        ("random-address", [low, high]) => random_address(AddressRange::new(
            script::parse_number(low)?,
            script::parse_number(high)?,
        ))?,
        ("pot-base", []) => {
            println!("{:#x}", pagerando::pot_base()?);
        }
        ("replay", [path]) => replay(path)?,
        ("help" | "--help" | "-h", _) => println!("{USAGE}"),
        _ => bail!("invalid arguments for {command:?}\n\n{USAGE}"),
    }

    Ok(())
}

fn random_address(range: AddressRange) -> Result<()> {
    let address = pagerando::random_address(range, OsEntropy)?;
    println!("{address:#x}");
    Ok(())
}

fn replay(path: &str) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let commands = script::parse(&text).with_context(|| format!("parsing {path}"))?;

    let mut map = RandoMap::init()?;
    script::run(&mut map, &commands, |address, region| match region {
        Some(region) => println!(
            "{address:#x} -> [{:#x}, {:#x}) undiv {:#x} vaddr {:#x} original {}",
            region.div_start,
            region.div_end,
            region.undiv_start,
            region.undiv_vaddr,
            region
                .original_address(address)
                .map_or_else(|| "?".to_string(), |orig| format!("{orig:#x}")),
        ),
        None => println!("{address:#x} -> none"),
    })?;

    map.validate()?;
    let stats = map.arena_stats();
    info!(
        "{} regions, height {}, {} pages of {:#x} bytes, {} free nodes",
        map.len(),
        map.height(),
        stats.pages,
        stats.page_size,
        stats.free,
    );

    Ok(())
}
