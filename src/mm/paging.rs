//! ARMv7 Short-Descriptor Translation Table Entries
//!
//! Decodes the two-level VMSAv7 short-descriptor format.
//!
//! # Table Structure
//! - L1: 4096 word entries, each covers 1 MiB. An entry is a fault, a
//!   pointer to an L2 table, a 1 MiB section or one of sixteen replicated
//!   entries of a 16 MiB supersection.
//! - L2: 256 word entries, each covers 4 KiB. An entry is a fault, one of
//!   sixteen replicated entries of a 64 KiB large page, or a 4 KiB small
//!   page.
//!
//! Field positions for permissions and memory type differ between the
//! three leaf formats; every leaf is normalised into the same
//! [`Attributes`] value here so the rest of the crate never looks at raw
//! descriptor bits.

use core::fmt;

use bitflags::bitflags;
use thiserror::Error;

use super::address::{
    PhysAddr, VirtAddr, LARGE_PAGE_SIZE, SECTION_SIZE, SMALL_PAGE_SIZE, SUPERSECTION_SIZE,
};
use super::attr::Attributes;

bitflags! {
    /// Single-bit fields of a first-level section or supersection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        /// Bufferable.
        const B = 1 << 2;
        /// Cacheable.
        const C = 1 << 3;
        /// Execute never.
        const XN = 1 << 4;
        /// Access permission extension.
        const APX = 1 << 15;
        /// Shareable.
        const S = 1 << 16;
        /// Not global.
        const NG = 1 << 17;
        /// Entry describes a 16 MiB supersection.
        const SUPERSECTION = 1 << 18;
        /// Non-secure.
        const NS = 1 << 19;
    }
}

bitflags! {
    /// Single-bit fields of a second-level large page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LargePageFlags: u32 {
        /// Bufferable.
        const B = 1 << 2;
        /// Cacheable.
        const C = 1 << 3;
        /// Access permission extension.
        const APX = 1 << 9;
        /// Shareable.
        const S = 1 << 10;
        /// Not global.
        const NG = 1 << 11;
        /// Execute never.
        const XN = 1 << 15;
    }
}

bitflags! {
    /// Single-bit fields of a second-level small page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SmallPageFlags: u32 {
        /// Execute never. Shares bit 0 with the descriptor type.
        const XN = 1 << 0;
        /// Bufferable.
        const B = 1 << 2;
        /// Cacheable.
        const C = 1 << 3;
        /// Access permission extension.
        const APX = 1 << 9;
        /// Shareable.
        const S = 1 << 10;
        /// Not global.
        const NG = 1 << 11;
    }
}

/// Error type for table walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WalkError {
    /// A descriptor or page address lies outside the loaded image.
    #[error("physical read at {addr} is outside the image ({base}..{end:08X})")]
    OutOfBounds {
        /// Address that was read.
        addr: PhysAddr,
        /// First address of the image.
        base: PhysAddr,
        /// One past the last address of the image.
        end: u64,
    },
    /// A page table descriptor has should-be-zero bits set.
    #[error("malformed page table descriptor {descriptor:08X} at {addr}: SBZ bits {sbz:#x} set")]
    ShouldBeZero {
        /// Where the descriptor was fetched from.
        addr: PhysAddr,
        /// The raw descriptor.
        descriptor: u32,
        /// The offending bits.
        sbz: u32,
    },
}

/// What kind of page produced a mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// 4 KiB, second level.
    SmallPage,
    /// 64 KiB, second level.
    LargePage,
    /// 1 MiB, first level.
    Section,
    /// 16 MiB, first level.
    Supersection,
}

impl PageKind {
    /// Size in bytes.
    #[inline]
    pub const fn size(self) -> u64 {
        match self {
            Self::SmallPage => SMALL_PAGE_SIZE,
            Self::LargePage => LARGE_PAGE_SIZE,
            Self::Section => SECTION_SIZE,
            Self::Supersection => SUPERSECTION_SIZE,
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SmallPage => "4K page",
            Self::LargePage => "64K page",
            Self::Section => "1M section",
            Self::Supersection => "16M supersection",
        };
        f.write_str(s)
    }
}

/// A resolved leaf: where a page lives and how it may be accessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    /// Physical base of the page.
    pub base: PhysAddr,
    /// Page format, which also fixes its size.
    pub kind: PageKind,
    /// Permission and memory type.
    pub attrs: Attributes,
}

impl Page {
    /// Physical address for a virtual address inside this page.
    #[inline]
    pub fn translate(&self, virt: VirtAddr) -> PhysAddr {
        PhysAddr::new(self.base.as_u64() | virt.page_offset(self.kind.size()))
    }
}

/// Decoded first-level entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirstLevel {
    /// Type `0b00`; unmapped.
    Fault,
    /// Type `0b01`; points to a second-level table.
    PageTable {
        /// Physical base of the 1 KiB second-level table.
        table: PhysAddr,
        /// Domain number, bits [8:5].
        domain: u8,
    },
    /// Type `0b10`; a section or supersection leaf.
    Page(Page),
    /// Type `0b11`; reserved, treated as a fault.
    Reserved,
}

/// Decoded second-level entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecondLevel {
    /// Type `0b00`; unmapped.
    Fault,
    /// Type `0b01`, `0b10` or `0b11`; a large or small page leaf.
    Page(Page),
}

/// A raw first-level descriptor.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct FirstLevelDescriptor(u32);

impl FirstLevelDescriptor {
    /// Should-be-zero bits of a page table descriptor, bits [4:1].
    pub const PAGE_TABLE_SBZ: u32 = 0x1E;
    /// Second-level table base, bits [31:10].
    const TABLE_MASK: u32 = 0xFFFF_FC00;
    const SECTION_MASK: u32 = 0xFFF0_0000;
    const SUPERSECTION_MASK: u32 = 0xFF00_0000;

    /// Wrap a raw descriptor word.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw descriptor word.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Descriptor type, bits [1:0].
    #[inline]
    pub const fn type_bits(self) -> u32 {
        self.0 & 0b11
    }

    /// Set should-be-zero bits, if this is a page table descriptor.
    #[inline]
    pub const fn sbz_violation(self) -> u32 {
        if self.type_bits() == 0b01 {
            self.0 & Self::PAGE_TABLE_SBZ
        } else {
            0
        }
    }

    /// Decode into its variant. Does not check should-be-zero bits; see
    /// [`FirstLevelDescriptor::sbz_violation`].
    pub fn decode(self) -> FirstLevel {
        let raw = self.0;
        match self.type_bits() {
            0b00 => FirstLevel::Fault,
            0b01 => FirstLevel::PageTable {
                table: PhysAddr::new((raw & Self::TABLE_MASK) as u64),
                domain: ((raw >> 5) & 0xF) as u8,
            },
            0b10 => FirstLevel::Page(self.section()),
            _ => FirstLevel::Reserved,
        }
    }

    fn section(self) -> Page {
        let raw = self.0;
        let flags = SectionFlags::from_bits_truncate(raw);
        let ap = ((raw >> 10) & 0b11) as u8 | if flags.contains(SectionFlags::APX) { 0b100 } else { 0 };
        let texcb = ((raw >> 2) & 0b11) as u8 | ((raw >> 10) & 0b1_1100) as u8;
        let attrs = Attributes::new(ap, texcb, flags.contains(SectionFlags::XN));

        if flags.contains(SectionFlags::SUPERSECTION) {
            Page {
                base: supersection_base(raw),
                kind: PageKind::Supersection,
                attrs,
            }
        } else {
            Page {
                base: PhysAddr::new((raw & Self::SECTION_MASK) as u64),
                kind: PageKind::Section,
                attrs,
            }
        }
    }
}

/// Physical base of a supersection.
///
/// PA[31:24] come from descriptor bits [31:24], PA[35:32] from the extended
/// base address field at [23:20] and PA[39:36] from [8:5]. The fields are
/// disjoint, so the result is a plain bit concatenation.
pub fn supersection_base(raw: u32) -> PhysAddr {
    let low = (raw & FirstLevelDescriptor::SUPERSECTION_MASK) as u64;
    let ext_35_32 = ((raw >> 20) & 0xF) as u64;
    let ext_39_36 = ((raw >> 5) & 0xF) as u64;
    PhysAddr::new(low | ext_35_32 << 32 | ext_39_36 << 36)
}

impl fmt::Debug for FirstLevelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L1({:08X}, type={:02b})", self.0, self.type_bits())
    }
}

/// A raw second-level descriptor.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SecondLevelDescriptor(u32);

impl SecondLevelDescriptor {
    const LARGE_MASK: u32 = 0xFFFF_0000;
    const SMALL_MASK: u32 = 0xFFFF_F000;

    /// Wrap a raw descriptor word.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw descriptor word.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Descriptor type, bits [1:0].
    #[inline]
    pub const fn type_bits(self) -> u32 {
        self.0 & 0b11
    }

    /// Decode into its variant.
    pub fn decode(self) -> SecondLevel {
        let raw = self.0;
        // AP[1:0] at [5:4] and APX at 9 for both page formats.
        let ap = ((raw >> 4) & 0b11) as u8 | ((raw >> 7) & 0b100) as u8;
        let cb = ((raw >> 2) & 0b11) as u8;

        match self.type_bits() {
            0b00 => SecondLevel::Fault,
            0b01 => {
                let flags = LargePageFlags::from_bits_truncate(raw);
                let texcb = cb | ((raw >> 10) & 0b1_1100) as u8;
                SecondLevel::Page(Page {
                    base: PhysAddr::new((raw & Self::LARGE_MASK) as u64),
                    kind: PageKind::LargePage,
                    attrs: Attributes::new(ap, texcb, flags.contains(LargePageFlags::XN)),
                })
            }
            _ => {
                let flags = SmallPageFlags::from_bits_truncate(raw);
                let texcb = cb | ((raw >> 4) & 0b1_1100) as u8;
                SecondLevel::Page(Page {
                    base: PhysAddr::new((raw & Self::SMALL_MASK) as u64),
                    kind: PageKind::SmallPage,
                    attrs: Attributes::new(ap, texcb, flags.contains(SmallPageFlags::XN)),
                })
            }
        }
    }
}

impl fmt::Debug for SecondLevelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L2({:08X}, type={:02b})", self.0, self.type_bits())
    }
}
