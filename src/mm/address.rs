//! Physical and Virtual Address Types
//!
//! Type-safe wrappers for the two address spaces a short-descriptor walk
//! moves between. Virtual addresses are always 32 bits wide; physical
//! addresses are carried as 64-bit values because supersections can reach
//! up to 40 bits of physical address space.
//!
//! # Table Split
//! TTBCR.N is not modelled. Every virtual address with any of bits
//! [31:25] set belongs to TTBR1, the rest (the low 32 MiB) to TTBR0. This
//! is the fixed arrangement of the supported targets, not a general VMSA
//! rule.

use core::fmt;

/// Walk granularity: one probe per 1 KiB of virtual address space.
///
/// Finer than any real page so an attribute change is never stepped over.
pub const GRANULE_SIZE: u64 = 1024;

/// Size of a small page (second level, 4 KiB).
pub const SMALL_PAGE_SIZE: u64 = 0x1000;
/// Size of a large page (second level, 64 KiB).
pub const LARGE_PAGE_SIZE: u64 = 0x1_0000;
/// Size of a section (first level, 1 MiB).
pub const SECTION_SIZE: u64 = 0x10_0000;
/// Size of a supersection (first level, 16 MiB).
pub const SUPERSECTION_SIZE: u64 = 0x100_0000;

/// Bit at which the virtual address space switches from TTBR0 to TTBR1.
pub const TABLE_SPLIT_SHIFT: u32 = 25;

/// First virtual address translated through TTBR1.
pub const TABLE_SPLIT: u64 = 1 << TABLE_SPLIT_SHIFT;

/// One past the last 32-bit virtual address.
pub const VIRT_SPACE_END: u64 = 1 << 32;

/// A physical memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Create a new physical address.
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Byte distance from `base` to this address, or `None` if it lies below.
    #[inline]
    pub const fn offset_from(self, base: PhysAddr) -> Option<u64> {
        self.0.checked_sub(base.0)
    }

    /// Add an offset to this address.
    #[inline]
    pub const fn add(self, offset: u64) -> Self {
        Self(self.0 + offset)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#010x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// A 32-bit virtual memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u32);

impl VirtAddr {
    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get the address widened to 64 bits, for range arithmetic.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    /// Which translation table root covers this address.
    #[inline]
    pub const fn table(self) -> TableIndex {
        if self.0 >> TABLE_SPLIT_SHIFT != 0 {
            TableIndex::Ttbr1
        } else {
            TableIndex::Ttbr0
        }
    }

    /// Byte offset of this address' entry within a first-level table.
    ///
    /// This is VA[31:20] scaled to a word index, i.e. bits [13:2].
    #[inline]
    pub const fn l1_entry_offset(self) -> u32 {
        (self.0 >> 18) & 0x3FFC
    }

    /// Byte offset of this address' entry within a second-level table.
    ///
    /// This is VA[19:12] scaled to a word index, i.e. bits [9:2].
    #[inline]
    pub const fn l2_entry_offset(self) -> u32 {
        (self.0 >> 10) & 0x3FC
    }

    /// The low bits of the address that fall inside a page of `size` bytes.
    #[inline]
    pub const fn page_offset(self, size: u64) -> u64 {
        self.0 as u64 & (size - 1)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Selects one of the two translation table roots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableIndex {
    /// Low virtual addresses, below [`TABLE_SPLIT`].
    Ttbr0,
    /// Everything from [`TABLE_SPLIT`] upwards.
    Ttbr1,
}

impl TableIndex {
    /// Both roots, in walk order.
    pub const ALL: [TableIndex; 2] = [TableIndex::Ttbr0, TableIndex::Ttbr1];

    /// Numeric index (0 or 1).
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Ttbr0 => 0,
            Self::Ttbr1 => 1,
        }
    }

    /// Mask applied to the register value to locate the first-level table.
    ///
    /// The TTBR0 table only covers 32 entries (128 bytes); TTBR1 points at a
    /// full 16 KiB table.
    #[inline]
    pub const fn base_mask(self) -> u32 {
        match self {
            Self::Ttbr0 => 0xFFFF_FF80,
            Self::Ttbr1 => 0xFFFF_C000,
        }
    }

    /// Half-open range of virtual addresses routed to this root.
    #[inline]
    pub const fn virt_range(self) -> (u64, u64) {
        match self {
            Self::Ttbr0 => (0, TABLE_SPLIT),
            Self::Ttbr1 => (TABLE_SPLIT, VIRT_SPACE_END),
        }
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TTBR{}", self.index())
    }
}
