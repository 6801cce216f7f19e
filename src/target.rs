//! Per-Target Configuration
//!
//! Which physical address a ROM dump starts at and what each CPU loads into
//! TTBR0/TTBR1 is fixed per camera model. Values here were read from
//! running devices.
//!
//! # Table Layout
//! The firmware keeps one 16 KiB L1 table shared by both cores for
//! everything above 32 MiB, followed by one 1 KiB L2 table per core for the
//! first megabyte and one 128-byte L1 table per core for the low 32 MiB.
//! TTBR0 therefore differs per core while TTBR1 is shared.

use core::fmt;

use thiserror::Error;

use crate::mm::{PhysAddr, TtbrPair};

/// Physical address ROM dumps of the supported targets start at.
pub const DEFAULT_ROM_BASE: PhysAddr = PhysAddr::new(0xE000_0000);

/// Errors raised while selecting a target or parsing register values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("unknown target {0:?} (known: {known})", known = known_names())]
    UnknownTarget(String),
    #[error("target {target} has no CPU{cpu}")]
    NoSuchCpu { target: String, cpu: usize },
    #[error("invalid hexadecimal value {0:?}")]
    InvalidHex(String),
    #[error("value {0:#x} does not fit in 32 bits")]
    TooWide(u64),
}

/// A camera model and its MMU configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// Model name, matched case-insensitively.
    pub name: &'static str,
    /// Physical address of the first byte of the ROM dump.
    pub rom_base: PhysAddr,
    /// TTBR pair of each CPU, indexed by CPU number.
    pub cpus: &'static [TtbrPair],
}

impl Target {
    /// TTBR pair of one CPU.
    pub fn cpu(&self, cpu: usize) -> Result<TtbrPair, TargetError> {
        self.cpus.get(cpu).copied().ok_or_else(|| TargetError::NoSuchCpu {
            target: self.name.to_string(),
            cpu,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<4} base={}", self.name, self.rom_base)?;
        for (cpu, pair) in self.cpus.iter().enumerate() {
            write!(f, " cpu{cpu}=[{:08X}, {:08X}]", pair.ttbr0, pair.ttbr1)?;
        }
        Ok(())
    }
}

/// Every known target.
pub static TARGETS: &[Target] = &[
    Target {
        name: "R5",
        rom_base: DEFAULT_ROM_BASE,
        cpus: &[
            TtbrPair::new(0xE000_4800, 0xE000_0000),
            TtbrPair::new(0xE000_4880, 0xE000_0000),
        ],
    },
    Target {
        name: "M50",
        rom_base: DEFAULT_ROM_BASE,
        cpus: &[
            TtbrPair::new(0xE000_4800, 0xE000_0080),
            TtbrPair::new(0xE000_4880, 0xE000_0080),
        ],
    },
];

/// Target used when none is named.
pub const DEFAULT_TARGET: &str = "R5";

/// Find a target by name, ignoring case.
pub fn lookup(name: &str) -> Result<&'static Target, TargetError> {
    TARGETS
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| TargetError::UnknownTarget(name.to_string()))
}

fn known_names() -> String {
    TARGETS.iter().map(|t| t.name).collect::<Vec<_>>().join(", ")
}

/// Parse a hexadecimal number, with or without a `0x` prefix and `_`
/// separators.
pub fn parse_hex(s: &str) -> Result<u64, TargetError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .replace('_', "");
    u64::from_str_radix(&digits, 16).map_err(|_| TargetError::InvalidHex(s.to_string()))
}

/// Parse a hexadecimal 32-bit register value.
pub fn parse_register(s: &str) -> Result<u32, TargetError> {
    let value = parse_hex(s)?;
    u32::try_from(value).map_err(|_| TargetError::TooWide(value))
}
