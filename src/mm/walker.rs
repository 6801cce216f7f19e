//! Translation Table Walker
//!
//! Replays the hardware table walk for every 1 KiB granule of a root's half
//! of the virtual address space and yields one [`MappingEntry`] for each
//! granule that resolves. Faulting granules are skipped.
//!
//! The walk is lazy and restartable: [`TableWalker::walk`] borrows the image
//! and can be called any number of times with identical results.
//!
//! With `debug` logging enabled every probed granule produces one diagnostic
//! line describing the descriptors that were visited.

use log::debug;

use super::address::{PhysAddr, TableIndex, VirtAddr, GRANULE_SIZE};
use super::attr::Attributes;
use super::image::RomImage;
use super::paging::{
    FirstLevel, FirstLevelDescriptor, PageKind, SecondLevel, SecondLevelDescriptor, WalkError,
};

/// The two translation table base registers of one CPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TtbrPair {
    /// Root for the low half of the address space.
    pub ttbr0: u32,
    /// Root for the high half of the address space.
    pub ttbr1: u32,
}

impl TtbrPair {
    pub const fn new(ttbr0: u32, ttbr1: u32) -> Self {
        Self { ttbr0, ttbr1 }
    }

    /// Register value for the given root.
    #[inline]
    pub const fn get(self, table: TableIndex) -> u32 {
        match table {
            TableIndex::Ttbr0 => self.ttbr0,
            TableIndex::Ttbr1 => self.ttbr1,
        }
    }
}

/// One resolved granule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappingEntry {
    /// Start of the granule.
    pub virt: VirtAddr,
    /// Physical address the granule's first byte maps to.
    pub phys: PhysAddr,
    /// Page the granule lies in.
    pub page: PageKind,
    /// Permission and memory type of that page.
    pub attrs: Attributes,
}

impl MappingEntry {
    /// Signed distance from the virtual to the physical address.
    #[inline]
    pub fn offset(&self) -> i64 {
        self.phys.as_u64() as i64 - self.virt.as_u64() as i64
    }

    /// Size of the page backing this granule.
    #[inline]
    pub fn page_size(&self) -> u64 {
        self.page.size()
    }
}

/// Walks the tables of one CPU.
#[derive(Clone, Copy, Debug)]
pub struct TableWalker<'a> {
    image: &'a RomImage,
    ttbrs: TtbrPair,
}

impl<'a> TableWalker<'a> {
    pub fn new(image: &'a RomImage, ttbrs: TtbrPair) -> Self {
        Self { image, ttbrs }
    }

    /// Lazily walk the half of the address space covered by `table`.
    ///
    /// A zero root yields nothing.
    pub fn walk(&self, table: TableIndex) -> Walk<'a> {
        let ttbr = self.ttbrs.get(table);
        let (start, end) = table.virt_range();
        Walk {
            image: self.image,
            table,
            ttbr,
            next: start,
            end: if ttbr == 0 { start } else { end },
        }
    }

    /// Walk TTBR0 then TTBR1.
    pub fn walk_all(&self) -> impl Iterator<Item = Result<MappingEntry, WalkError>> + 'a {
        let walker = *self;
        TableIndex::ALL
            .into_iter()
            .flat_map(move |table| walker.walk(table))
    }

    /// Translate a single address through the given root.
    pub fn resolve(
        &self,
        table: TableIndex,
        virt: VirtAddr,
    ) -> Result<Option<MappingEntry>, WalkError> {
        resolve(self.image, table, self.ttbrs.get(table), virt)
    }
}

/// Walk both roots of one CPU. Shorthand for [`TableWalker::walk_all`].
pub fn walk(
    image: &RomImage,
    ttbrs: TtbrPair,
) -> impl Iterator<Item = Result<MappingEntry, WalkError>> + '_ {
    TableWalker::new(image, ttbrs).walk_all()
}

/// Lazy walk over one root. Stops after the first error.
#[derive(Clone, Debug)]
pub struct Walk<'a> {
    image: &'a RomImage,
    table: TableIndex,
    ttbr: u32,
    next: u64,
    end: u64,
}

impl Iterator for Walk<'_> {
    type Item = Result<MappingEntry, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.end {
            let virt = VirtAddr::new(self.next as u32);
            self.next += GRANULE_SIZE;

            match resolve(self.image, self.table, self.ttbr, virt) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(err) => {
                    self.next = self.end;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

/// Perform the table walk for one virtual address.
///
/// Returns `Ok(None)` when the address faults.
pub fn resolve(
    image: &RomImage,
    table: TableIndex,
    ttbr: u32,
    virt: VirtAddr,
) -> Result<Option<MappingEntry>, WalkError> {
    let l1_addr = PhysAddr::new(((ttbr & table.base_mask()) | virt.l1_entry_offset()) as u64);
    let l1 = FirstLevelDescriptor::new(image.read_u32(l1_addr)?);

    let page = match l1.decode() {
        FirstLevel::Fault => {
            debug!("{virt} [{l1_addr}]: {:08X} {:02b} fault", l1.as_u32(), l1.type_bits());
            return Ok(None);
        }
        FirstLevel::Reserved => {
            debug!("{virt} [{l1_addr}]: {:08X} {:02b} reserved", l1.as_u32(), l1.type_bits());
            return Ok(None);
        }
        FirstLevel::PageTable {
            table: l2_table,
            domain,
        } => {
            let sbz = l1.sbz_violation();
            if sbz != 0 {
                return Err(WalkError::ShouldBeZero {
                    addr: l1_addr,
                    descriptor: l1.as_u32(),
                    sbz,
                });
            }

            let l2_addr = PhysAddr::new(l2_table.as_u64() | virt.l2_entry_offset() as u64);
            let l2 = SecondLevelDescriptor::new(image.read_u32(l2_addr)?);
            match l2.decode() {
                SecondLevel::Fault => {
                    debug!(
                        "{virt} [{l1_addr}]: {:08X} {:02b} L2 table={l2_table} domain={domain:X} entry={l2_addr}: {:08X} fault",
                        l1.as_u32(),
                        l1.type_bits(),
                        l2.as_u32()
                    );
                    return Ok(None);
                }
                SecondLevel::Page(page) => {
                    debug!(
                        "{virt} [{l1_addr}]: {:08X} {:02b} L2 table={l2_table} domain={domain:X} entry={l2_addr}: {:08X} {} at {} -> {}",
                        l1.as_u32(),
                        l1.type_bits(),
                        l2.as_u32(),
                        page.kind,
                        page.base,
                        page.translate(virt)
                    );
                    page
                }
            }
        }
        FirstLevel::Page(page) => {
            debug!(
                "{virt} [{l1_addr}]: {:08X} {:02b} {} at {} -> {}",
                l1.as_u32(),
                l1.type_bits(),
                page.kind,
                page.base,
                page.translate(virt)
            );
            page
        }
    };

    Ok(Some(MappingEntry {
        virt,
        phys: page.translate(virt),
        page: page.kind,
        attrs: page.attrs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 0xE000_0000;
    /// TTBR1 table: a full 16 KiB L1 table at the start of the image.
    const TTBR1: u32 = 0xE000_0000;
    /// TTBR0 table: 32 entries after the L2 tables, as laid out by the firmware.
    const TTBR0: u32 = 0xE000_4800;
    const L2_TABLE: u32 = 0xE000_4000;

    fn image_with(words: &[(u32, u32)]) -> RomImage {
        let mut bytes = vec![0u8; 0x1_0000];
        for &(addr, word) in words {
            let at = (addr as u64 - BASE) as usize;
            bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        RomImage::new(PhysAddr::new(BASE), bytes)
    }

    fn section(base: u32) -> u32 {
        // AP = 0b01, C:B = 0b01
        base | (0b01 << 10) | (1 << 2) | 0b10
    }

    #[test]
    fn test_zero_roots_yield_nothing() {
        let image = image_with(&[]);
        assert_eq!(walk(&image, TtbrPair::new(0, 0)).count(), 0);
    }

    #[test]
    fn test_small_page_through_ttbr0() {
        let image = image_with(&[
            // VA 0x0010_0000 -> page table
            (TTBR0 + 4, L2_TABLE | 0b01),
            // VA 0x0010_1000 -> small page
            (L2_TABLE + 4, 0xE000_8000 | (0b01 << 4) | (1 << 2) | 0b10),
        ]);
        let walker = TableWalker::new(&image, TtbrPair::new(TTBR0, 0));
        let entries: Vec<_> = walker
            .walk(TableIndex::Ttbr0)
            .collect::<Result<_, _>>()
            .expect("walk");

        assert_eq!(entries.len(), 4);
        for (i, entry) in entries.iter().enumerate() {
            let step = i as u64 * GRANULE_SIZE;
            assert_eq!(entry.virt.as_u64(), 0x0010_1000 + step);
            assert_eq!(entry.phys.as_u64(), 0xE000_8000 + step);
            assert_eq!(entry.page, PageKind::SmallPage);
            assert_eq!(entry.attrs, Attributes::new(0b001, 0b00001, false));
        }
    }

    #[test]
    fn test_split_routes_boundary_to_ttbr1() {
        let image = image_with(&[
            // TTBR1 entry for 0x01F0_0000 is never consulted.
            (TTBR1 + 0x7C, section(0x1000_0000)),
            (TTBR1 + 0x80, section(0x2000_0000)),
            (TTBR0 + 0x7C, section(0x3000_0000)),
        ]);
        let walker = TableWalker::new(&image, TtbrPair::new(TTBR0, TTBR1));

        let last_low = walker.walk(TableIndex::Ttbr0).last().expect("entry").expect("walk");
        assert_eq!(last_low.virt, VirtAddr::new(0x01FF_FC00));
        assert_eq!(last_low.phys, PhysAddr::new(0x300F_FC00));

        let first_high = walker.walk(TableIndex::Ttbr1).next().expect("entry").expect("walk");
        assert_eq!(first_high.virt, VirtAddr::new(0x0200_0000));
        assert_eq!(first_high.phys, PhysAddr::new(0x2000_0000));
        assert_eq!(first_high.page, PageKind::Section);
    }

    #[test]
    fn test_resolve_supersection() {
        let raw = 0x4000_0000 | (0x2 << 20) | (0x1 << 5) | (1 << 18) | (0b11 << 10) | 0b10;
        let image = image_with(&[(TTBR1 + (0xC00 << 2), raw)]);
        let walker = TableWalker::new(&image, TtbrPair::new(0, TTBR1));

        let entry = walker
            .resolve(TableIndex::Ttbr1, VirtAddr::new(0xC002_3400))
            .expect("walk")
            .expect("mapped");
        assert_eq!(entry.page, PageKind::Supersection);
        assert_eq!(entry.phys, PhysAddr::new(0x12_4002_3400));
        assert_eq!(entry.offset(), 0x12_4002_3400 - 0xC002_3400);
    }

    #[test]
    fn test_resolve_large_page() {
        let image = image_with(&[
            (TTBR1 + (0x400 << 2), L2_TABLE | 0b01),
            // Large pages are replicated across 16 consecutive L2 entries.
            (L2_TABLE + 0x40, 0x1234_0000 | (1 << 15) | (0b11 << 4) | 0b01),
        ]);
        let walker = TableWalker::new(&image, TtbrPair::new(0, TTBR1));
        let entry = walker
            .resolve(TableIndex::Ttbr1, VirtAddr::new(0x4001_0400))
            .expect("walk")
            .expect("mapped");
        assert_eq!(entry.page, PageKind::LargePage);
        assert_eq!(entry.phys, PhysAddr::new(0x1234_0400));
        assert!(entry.attrs.xn);
        assert_eq!(entry.page_size(), 0x1_0000);
    }

    #[test]
    fn test_l2_fault_and_reserved_are_skipped() {
        let image = image_with(&[
            (TTBR0, L2_TABLE | 0b01),
            (TTBR0 + 4, 0xE000_0003),
        ]);
        let walker = TableWalker::new(&image, TtbrPair::new(TTBR0, 0));
        assert_eq!(walker.resolve(TableIndex::Ttbr0, VirtAddr::new(0x0000_1000)), Ok(None));
        assert_eq!(walker.resolve(TableIndex::Ttbr0, VirtAddr::new(0x0010_0000)), Ok(None));
        assert_eq!(walker.walk(TableIndex::Ttbr0).count(), 0);
    }

    #[test]
    fn test_sbz_violation_aborts_walk() {
        let bad = L2_TABLE | (1 << 2) | 0b01;
        let image = image_with(&[(TTBR0 + 8, bad)]);
        let walker = TableWalker::new(&image, TtbrPair::new(TTBR0, 0));

        let mut walk = walker.walk(TableIndex::Ttbr0);
        assert_eq!(
            walk.next(),
            Some(Err(WalkError::ShouldBeZero {
                addr: PhysAddr::new(TTBR0 as u64 + 8),
                descriptor: bad,
                sbz: 1 << 2,
            }))
        );
        assert_eq!(walk.next(), None);
    }

    #[test]
    fn test_out_of_bounds_root() {
        let image = image_with(&[]);
        let walker = TableWalker::new(&image, TtbrPair::new(0xD000_0000, 0));
        let mut walk = walker.walk(TableIndex::Ttbr0);
        assert!(matches!(walk.next(), Some(Err(WalkError::OutOfBounds { .. }))));
        assert_eq!(walk.next(), None);
    }

    #[test]
    fn test_out_of_bounds_l2_table() {
        let image = image_with(&[(TTBR0, 0x1000_0000 | 0b01)]);
        let walker = TableWalker::new(&image, TtbrPair::new(TTBR0, 0));
        assert!(matches!(
            walker.resolve(TableIndex::Ttbr0, VirtAddr::new(0)),
            Err(WalkError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_walk_is_restartable() {
        let image = image_with(&[
            (TTBR0 + 4, L2_TABLE | 0b01),
            (L2_TABLE + 4, 0xE000_8000 | (0b01 << 4) | (1 << 2) | 0b10),
            (TTBR0 + 0x40, section(0x8000_0000)),
        ]);
        let walker = TableWalker::new(&image, TtbrPair::new(TTBR0, 0));
        let first: Vec<_> = walker.walk(TableIndex::Ttbr0).collect();
        let second: Vec<_> = walker.walk(TableIndex::Ttbr0).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4 + 1024);
    }
}
