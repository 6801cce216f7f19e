//! Physical Memory Image
//!
//! A ROM dump stands in for physical memory. The image is loaded once and
//! only ever read; every access is bounds-checked against the window
//! `[base, base + len)` it was loaded at.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use super::address::PhysAddr;
use super::paging::WalkError;

/// Errors raised while loading an image from disk.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The file could not be read.
    #[error("failed to read ROM image {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file exists but holds no data.
    #[error("ROM image {} is empty", .path.display())]
    Empty { path: PathBuf },
}

/// A read-only window of physical memory backed by a byte buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct RomImage {
    base: PhysAddr,
    bytes: Vec<u8>,
}

impl RomImage {
    /// Wrap an in-memory buffer located at `base`.
    pub fn new(base: PhysAddr, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            base,
            bytes: bytes.into(),
        }
    }

    /// Read a whole file and place it at `base`.
    pub fn load(path: &Path, base: PhysAddr) -> Result<Self, ImageError> {
        let bytes = fs::read(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let image = Self::new(base, bytes);
        if image.is_empty() {
            return Err(ImageError::Empty {
                path: path.to_path_buf(),
            });
        }
        info!(
            "loaded {} ({} bytes) at {}",
            path.display(),
            image.len(),
            image.base()
        );
        Ok(image)
    }

    /// Physical address of the first byte.
    #[inline]
    pub fn base(&self) -> PhysAddr {
        self.base
    }

    /// One past the last physical address covered.
    #[inline]
    pub fn end(&self) -> u64 {
        self.base.as_u64() + self.bytes.len() as u64
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the image holds no bytes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `len` bytes starting at `addr` are inside the image.
    pub fn contains(&self, addr: PhysAddr, len: u64) -> bool {
        addr.offset_from(self.base)
            .and_then(|offset| offset.checked_add(len))
            .is_some_and(|end| end <= self.bytes.len() as u64)
    }

    /// Read a little-endian 32-bit word.
    pub fn read_u32(&self, addr: PhysAddr) -> Result<u32, WalkError> {
        if !self.contains(addr, 4) {
            return Err(WalkError::OutOfBounds {
                addr,
                base: self.base,
                end: self.end(),
            });
        }
        // In bounds, so the offset fits the buffer's usize index space.
        let start = (addr.as_u64() - self.base.as_u64()) as usize;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[start..start + 4]);
        Ok(u32::from_le_bytes(word))
    }
}

impl core::fmt::Debug for RomImage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RomImage({}..{:08X})", self.base(), self.end())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const BASE: PhysAddr = PhysAddr::new(0xE000_0000);

    #[test]
    fn test_read_little_endian() {
        let image = RomImage::new(BASE, vec![0x78, 0x56, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(image.read_u32(BASE), Ok(0x1234_5678));
        assert_eq!(image.read_u32(BASE.add(4)), Ok(0xDEAD_BEEF));
    }

    #[test]
    fn test_read_out_of_bounds() {
        let image = RomImage::new(BASE, vec![0; 8]);
        // Straddles the end.
        assert_eq!(
            image.read_u32(BASE.add(6)),
            Err(WalkError::OutOfBounds {
                addr: BASE.add(6),
                base: BASE,
                end: 0xE000_0008,
            })
        );
        // Below the base.
        assert!(image.read_u32(PhysAddr::new(0xDFFF_FFFC)).is_err());
        // Far above, past 32 bits.
        assert!(image.read_u32(PhysAddr::new(0x1_E000_0000)).is_err());
    }

    #[test]
    fn test_contains() {
        let image = RomImage::new(BASE, vec![0; 16]);
        assert_eq!(image.end(), 0xE000_0010);
        assert!(image.contains(BASE, 16));
        assert!(!image.contains(BASE, 17));
        assert!(image.contains(BASE.add(12), 4));
        assert!(!image.contains(PhysAddr::new(u64::MAX), 4));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&[1, 0, 0, 0, 2, 0, 0, 0]).expect("write");

        let image = RomImage::load(file.path(), BASE).expect("load");
        assert_eq!(image.base(), BASE);
        assert_eq!(image.len(), 8);
        assert!(!image.is_empty());
        assert_eq!(image.read_u32(BASE.add(4)), Ok(2));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("ROM1.BIN");
        let err = RomImage::load(&missing, BASE).expect_err("should fail");
        assert!(matches!(err, ImageError::Io { .. }));
        assert!(err.to_string().contains("ROM1.BIN"));
    }

    #[test]
    fn test_load_empty_file() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let err = RomImage::load(file.path(), BASE).expect_err("should fail");
        assert!(matches!(err, ImageError::Empty { .. }));
    }
}
