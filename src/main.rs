//! mmumap - dump the VA -> PA mappings of cameras whose MMU tables live in ROM
//!
//! ```text
//! mmumap ROM1.BIN                 # CPU0 and CPU1 of the default target
//! mmumap --target M50 ROM1.BIN
//! mmumap -v --cpu 1 ROM1.BIN      # per-granule diagnostics on stderr
//! mmumap --long-labels ROM1.BIN   # descriptive attribute labels
//! mmumap --ttbr0 E0004800 --ttbr1 E0000000 ROM1.BIN
//! ```

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, error};

use mmumap::mm::{PhysAddr, RomImage, TtbrPair};
use mmumap::target::{self, DEFAULT_TARGET};
use mmumap::{LabelStyle, Report};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the ROM image holding the MMU tables.
    #[arg(required_unless_present = "list_targets")]
    rom: Option<PathBuf>,
    /// Camera model whose TTBR values and ROM base to use.
    #[arg(short, long, default_value = DEFAULT_TARGET)]
    target: String,
    /// Override the physical address the image is loaded at (hex).
    #[arg(long, value_parser = target::parse_hex)]
    base: Option<u64>,
    /// Only walk this CPU.
    #[arg(long)]
    cpu: Option<usize>,
    /// Custom TTBR0 for a single CPU (hex); requires --ttbr1.
    #[arg(long, value_parser = target::parse_register, requires = "ttbr1")]
    ttbr0: Option<u32>,
    /// Custom TTBR1 for a single CPU (hex); requires --ttbr0.
    #[arg(long, value_parser = target::parse_register, requires = "ttbr0")]
    ttbr1: Option<u32>,
    /// Spell out access permissions and memory types instead of the short forms.
    #[arg(short, long)]
    long_labels: bool,
    /// Log every probed granule to stderr.
    #[arg(short, long)]
    verbose: bool,
    /// Print the known targets and exit.
    #[arg(long)]
    list_targets: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// CPUs to walk, with their roots, as selected on the command line.
fn select_cpus(args: &Args, target: &target::Target) -> Result<Vec<(usize, TtbrPair)>> {
    if let (Some(ttbr0), Some(ttbr1)) = (args.ttbr0, args.ttbr1) {
        return Ok(vec![(args.cpu.unwrap_or(0), TtbrPair::new(ttbr0, ttbr1))]);
    }
    match args.cpu {
        Some(cpu) => Ok(vec![(cpu, target.cpu(cpu)?)]),
        None => Ok(target.cpus.iter().copied().enumerate().collect()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_targets {
        for t in target::TARGETS {
            println!("{t}");
        }
        return Ok(());
    }

    let target = target::lookup(&args.target)?;
    let cpus = select_cpus(&args, target)?;
    let base = args.base.map(PhysAddr::new).unwrap_or(target.rom_base);

    let Some(rom) = args.rom.as_deref() else {
        bail!("no ROM image given");
    };
    let rom = rom
        .canonicalize()
        .with_context(|| format!("ROM didn't exist: '{}'", rom.display()))?;
    let image = RomImage::load(&rom, base)?;
    debug!("using {image:?} for target {}", target.name);

    let style = if args.long_labels {
        LabelStyle::Long
    } else {
        LabelStyle::Compact
    };
    let mut report = Report::with_style(io::stdout().lock(), style);
    let outcomes = mmumap::dump(&image, &cpus, &mut report).context("failed to write report")?;

    let mut failed = 0;
    for outcome in &outcomes {
        if let Err(err) = &outcome.result {
            error!("CPU{} {}: {err}", outcome.cpu, outcome.table);
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {} passes aborted", outcomes.len());
    }
    Ok(())
}
