//! # Region Scripts
//!
//! A line-oriented description of what a loader would report to the map:
//!
//! ```text
//! # div_start div_size undiv_start undiv_vaddr [div_offset:undiv_offset:size ...]
//! add 0x1000 0x1000 0x7000 0x8000 0x0:0x100:0x100 0x100:0x0:0x100
//! find 0x1050
//! delete 0x1000
//! ```
//!
//! Numbers are hexadecimal with a `0x` prefix, or decimal.

use anyhow::{Context as _, Result, anyhow, bail};
use rando_map::{RandoFunction, RandoMap, Translation};



#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Add {
        div_start: usize,
        div_size: usize,
        undiv_start: usize,
        undiv_vaddr: usize,
        funcs: Vec<RandoFunction>,
    },
    Delete {
        div_start: usize,
    },
    Find {
        address: usize,
    },
}

/// Parse a whole script. Blank lines and `#` comments are skipped.
pub fn parse(script: &str) -> Result<Vec<Command>> {
    script
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.split('#').next().unwrap_or_default().trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(number, line)| parse_line(line).with_context(|| format!("line {number}")))
        .collect()
}

fn parse_line(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(op) = words.next() else {
        bail!("empty command");
    };
    let mut next = |what: &str| -> Result<usize> {
        let word = words.next().ok_or_else(|| anyhow!("missing {what}"))?;
        parse_number(word).with_context(|| format!("bad {what} {word:?}"))
    };

    let command = match op {
        "add" => {
            let div_start = next("div_start")?;
            let div_size = next("div_size")?;
            let undiv_start = next("undiv_start")?;
            let undiv_vaddr = next("undiv_vaddr")?;
            let funcs = words.map(parse_function).collect::<Result<_>>()?;
            return Ok(Command::Add {
                div_start,
                div_size,
                undiv_start,
                undiv_vaddr,
                funcs,
            });
        }
        "delete" => Command::Delete {
            div_start: next("div_start")?,
        },
        "find" => Command::Find {
            address: next("address")?,
        },
        _ => bail!("unknown command {op:?}"),
    };

    if let Some(extra) = words.next() {
        bail!("unexpected {extra:?}");
    }
    Ok(command)
}

fn parse_function(word: &str) -> Result<RandoFunction> {
    let mut parts = word.split(':').map(parse_number);
    let (Some(div_offset), Some(undiv_offset), Some(size), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        bail!("function {word:?} is not div_offset:undiv_offset:size");
    };

    Ok(RandoFunction {
        div_offset: div_offset?,
        undiv_offset: undiv_offset?,
        size: size?,
    })
}

pub fn parse_number(word: &str) -> Result<usize> {
    let res = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => word.parse(),
    };
    res.with_context(|| format!("invalid number {word:?}"))
}



/// Apply `commands` to `map`, calling `found` with the result of every
/// `find`. Stops at the first command the map rejects.
pub fn run<E: rando_map::Entropy>(
    map: &mut RandoMap<E>,
    commands: &[Command],
    mut found: impl FnMut(usize, Option<Translation<'_>>),
) -> Result<()> {
    for command in commands {
        match command {
            Command::Add {
                div_start,
                div_size,
                undiv_start,
                undiv_vaddr,
                funcs,
            } => map
                .add(*div_start, *div_size, *undiv_start, *undiv_vaddr, funcs)
                .with_context(|| format!("adding region at {div_start:#x}"))?,
            Command::Delete { div_start } => map
                .delete(*div_start)
                .with_context(|| format!("deleting region at {div_start:#x}"))?,
            Command::Find { address } => found(*address, map.find(*address)),
        }
    }

    Ok(())
}
