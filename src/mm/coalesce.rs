//! Range Coalescing
//!
//! Folds the walker's per-granule stream into maximal runs. A granule joins
//! the current run only if it starts exactly where the run ends, keeps the
//! same virtual-to-physical offset, and carries identical attributes. A
//! faulting granule leaves a hole in the stream, so it always splits a run.
//! Runs never cross the TTBR0/TTBR1 split, even when both roots map the
//! addresses on either side of it identically.

use super::address::{PhysAddr, VirtAddr, GRANULE_SIZE};
use super::attr::{AccessPermission, Attributes, DecodeError, ExecuteNever, MemoryType};
use super::paging::PageKind;
use super::walker::MappingEntry;

/// A maximal run of granules with uniform translation and attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergedRange {
    /// First virtual address of the run.
    pub virt_start: VirtAddr,
    /// First physical address of the run.
    pub phys_start: PhysAddr,
    /// Length in bytes; always a multiple of [`GRANULE_SIZE`].
    pub size: u64,
    /// Shared raw attributes.
    pub attrs: Attributes,
}

impl MergedRange {
    /// A run holding just `entry`.
    pub fn from_entry(entry: &MappingEntry) -> Self {
        Self {
            virt_start: entry.virt,
            phys_start: entry.phys,
            size: GRANULE_SIZE,
            attrs: entry.attrs,
        }
    }

    /// Last virtual address covered (inclusive).
    #[inline]
    pub fn virt_end(&self) -> u64 {
        self.virt_start.as_u64() + self.size - 1
    }

    /// Last physical address covered (inclusive).
    #[inline]
    pub fn phys_end(&self) -> u64 {
        self.phys_start.as_u64() + self.size - 1
    }

    /// Signed distance from the virtual to the physical address.
    #[inline]
    pub fn offset(&self) -> i64 {
        self.phys_start.as_u64() as i64 - self.virt_start.as_u64() as i64
    }

    /// Whether `entry` continues this run.
    pub fn extends_with(&self, entry: &MappingEntry) -> bool {
        entry.virt.table() == self.virt_start.table()
            && entry.offset() == self.offset()
            && entry.attrs == self.attrs
            && entry.virt.as_u64() == self.virt_start.as_u64() + self.size
    }

    /// Decoded access permission.
    pub fn access(&self) -> Result<AccessPermission, DecodeError> {
        self.attrs.access()
    }

    /// Decoded memory type.
    pub fn memory_type(&self) -> Result<MemoryType, DecodeError> {
        self.attrs.memory_type()
    }

    /// Execute-never marker.
    pub fn execute_never(&self) -> ExecuteNever {
        self.attrs.execute_never()
    }

    /// Split the run back into the granule entries it was built from.
    ///
    /// Page kinds are not tracked per run, so every granule is reported as
    /// belonging to `page`.
    pub fn granules(&self, page: PageKind) -> impl Iterator<Item = MappingEntry> + '_ {
        (0..self.size / GRANULE_SIZE).map(move |i| MappingEntry {
            virt: VirtAddr::new((self.virt_start.as_u64() + i * GRANULE_SIZE) as u32),
            phys: self.phys_start.add(i * GRANULE_SIZE),
            page,
            attrs: self.attrs,
        })
    }
}

/// Accumulator for a single coalescing pass.
///
/// Feed entries in ascending virtual order with [`Coalescer::push`]; each
/// call returns the previous run when the new entry cannot extend it. Call
/// [`Coalescer::finish`] at the end of the stream for the final run.
#[derive(Clone, Debug, Default)]
pub struct Coalescer {
    current: Option<MergedRange>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry, returning a completed run if it closed one.
    pub fn push(&mut self, entry: &MappingEntry) -> Option<MergedRange> {
        if let Some(run) = self.current.as_mut() {
            if run.extends_with(entry) {
                run.size += GRANULE_SIZE;
                return None;
            }
        }
        self.current.replace(MergedRange::from_entry(entry))
    }

    /// The run still being accumulated, if any.
    pub fn pending(&self) -> Option<&MergedRange> {
        self.current.as_ref()
    }

    /// End the pass and hand back the last run.
    pub fn finish(self) -> Option<MergedRange> {
        self.current
    }
}

/// Lazily coalesce an entry stream.
pub fn coalesce<I>(entries: I) -> Coalesce<I::IntoIter>
where
    I: IntoIterator<Item = MappingEntry>,
{
    Coalesce {
        entries: entries.into_iter(),
        coalescer: Some(Coalescer::new()),
    }
}

/// Iterator returned by [`coalesce`].
#[derive(Clone, Debug)]
pub struct Coalesce<I> {
    entries: I,
    coalescer: Option<Coalescer>,
}

impl<I: Iterator<Item = MappingEntry>> Iterator for Coalesce<I> {
    type Item = MergedRange;

    fn next(&mut self) -> Option<MergedRange> {
        let coalescer = self.coalescer.as_mut()?;
        for entry in self.entries.by_ref() {
            if let Some(run) = coalescer.push(&entry) {
                return Some(run);
            }
        }
        self.coalescer.take().and_then(Coalescer::finish)
    }
}
