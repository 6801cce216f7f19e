//! Translation table recovery for ARMv7 short-descriptor MMUs
//!
//! Provides:
//! - Address types and the fixed TTBR0/TTBR1 split
//! - Descriptor decoding for both table levels
//! - A lazy table walker over a ROM image
//! - Attribute decoding and range coalescing
//!
//! # Principles
//! - The image is never written to
//! - Malformed descriptors stop the walk; nothing is guessed
//! - Faults are not errors, they are holes in the map

pub mod address;
pub mod attr;
pub mod coalesce;
pub mod image;
pub mod paging;
pub mod walker;

pub use address::{PhysAddr, TableIndex, VirtAddr, GRANULE_SIZE};
pub use attr::{AccessPermission, Attributes, Cacheability, DecodeError, ExecuteNever, MemoryType};
pub use coalesce::{coalesce, Coalescer, MergedRange};
pub use image::{ImageError, RomImage};
pub use paging::{PageKind, WalkError};
pub use walker::{walk, MappingEntry, TableWalker, TtbrPair};
