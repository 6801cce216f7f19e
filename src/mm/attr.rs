//! Memory Attribute Decoding
//!
//! Turns the raw permission and memory-type fields gathered during the walk
//! into named values. Only encodings the supported firmware actually uses
//! are accepted; anything else is reported as a [`DecodeError`] instead of
//! being guessed at.
//!
//! # TEXCB
//! The walker packs `TEX[2:0]`, `C` and `B` into one 5-bit value laid out as
//! `TEX:C:B`. With TEX remapping disabled, `TEX[2] == 1` selects Normal
//! memory where `TEX[1:0]` is the outer and `C:B` the inner cache policy.

use core::fmt;

use thiserror::Error;

/// Errors raised by the attribute decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// `APX:AP[1:0]` value outside the supported set.
    #[error("unsupported access permission encoding {0:#05b}")]
    AccessPermission(u8),
    /// `TEX:C:B` value that is neither Normal, Device nor Strongly-ordered.
    #[error("unsupported memory type encoding {0:#07b}")]
    MemoryType(u8),
}

/// Raw attribute fields of one mapped granule.
///
/// Two granules can only be merged into one range if these compare equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Attributes {
    /// `APX:AP[1:0]`, 3 bits.
    pub ap: u8,
    /// `TEX[2:0]:C:B`, 5 bits.
    pub texcb: u8,
    /// Execute-never.
    pub xn: bool,
}

impl Attributes {
    /// Bundle raw fields, masking each to its architectural width.
    #[inline]
    pub const fn new(ap: u8, texcb: u8, xn: bool) -> Self {
        Self {
            ap: ap & 0b111,
            texcb: texcb & 0b1_1111,
            xn,
        }
    }

    /// Decode the access permission field.
    pub fn access(self) -> Result<AccessPermission, DecodeError> {
        AccessPermission::try_from(self.ap)
    }

    /// Decode the memory type field.
    pub fn memory_type(self) -> Result<MemoryType, DecodeError> {
        MemoryType::try_from(self.texcb)
    }

    /// Decode the execute-never bit.
    #[inline]
    pub const fn execute_never(self) -> ExecuteNever {
        ExecuteNever(self.xn)
    }
}

/// Access permissions as encoded by `APX:AP[1:0]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessPermission {
    /// `0b001`: privileged read/write, no user access.
    PrivilegedReadWrite,
    /// `0b101`: privileged read-only, no user access.
    PrivilegedReadOnly,
    /// `0b011`: read/write at any privilege level.
    ReadWrite,
}

impl AccessPermission {
    /// Every supported encoding.
    pub const ALL: [AccessPermission; 3] = [
        Self::PrivilegedReadWrite,
        Self::PrivilegedReadOnly,
        Self::ReadWrite,
    ];

    /// The raw 3-bit encoding.
    pub const fn bits(self) -> u8 {
        match self {
            Self::PrivilegedReadWrite => 0b001,
            Self::PrivilegedReadOnly => 0b101,
            Self::ReadWrite => 0b011,
        }
    }

    /// Human readable description.
    pub const fn label(self) -> &'static str {
        match self {
            Self::PrivilegedReadWrite => "privileged read-write",
            Self::PrivilegedReadOnly => "privileged read-only",
            Self::ReadWrite => "read-write",
        }
    }
}

impl TryFrom<u8> for AccessPermission {
    type Error = DecodeError;

    fn try_from(ap: u8) -> Result<Self, Self::Error> {
        match ap {
            0b001 => Ok(Self::PrivilegedReadWrite),
            0b101 => Ok(Self::PrivilegedReadOnly),
            0b011 => Ok(Self::ReadWrite),
            other => Err(DecodeError::AccessPermission(other)),
        }
    }
}

/// Short column form used in the range report.
impl fmt::Display for AccessPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PrivilegedReadWrite => "P:RW",
            Self::PrivilegedReadOnly => "P:R",
            Self::ReadWrite => "RW",
        };
        f.pad(s)
    }
}

/// Cache policy for one level of Normal memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cacheability {
    /// `0b00`
    NonCacheable,
    /// `0b01`
    WriteBackWriteAllocate,
    /// `0b10`
    WriteThroughNoWriteAllocate,
    /// `0b11`
    WriteBackNoWriteAllocate,
}

impl Cacheability {
    /// Every policy, ordered by encoding.
    pub const ALL: [Cacheability; 4] = [
        Self::NonCacheable,
        Self::WriteBackWriteAllocate,
        Self::WriteThroughNoWriteAllocate,
        Self::WriteBackNoWriteAllocate,
    ];

    /// Decode a 2-bit policy field. Only the low two bits are looked at.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::NonCacheable,
            0b01 => Self::WriteBackWriteAllocate,
            0b10 => Self::WriteThroughNoWriteAllocate,
            _ => Self::WriteBackNoWriteAllocate,
        }
    }

    /// The raw 2-bit encoding.
    pub const fn bits(self) -> u8 {
        match self {
            Self::NonCacheable => 0b00,
            Self::WriteBackWriteAllocate => 0b01,
            Self::WriteThroughNoWriteAllocate => 0b10,
            Self::WriteBackNoWriteAllocate => 0b11,
        }
    }

    /// Human readable description.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NonCacheable => "non-cacheable",
            Self::WriteBackWriteAllocate => "write-back write-allocate",
            Self::WriteThroughNoWriteAllocate => "write-through no-write-allocate",
            Self::WriteBackNoWriteAllocate => "write-back no-write-allocate",
        }
    }
}

impl fmt::Display for Cacheability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NonCacheable => "NCACH",
            Self::WriteBackWriteAllocate => "WB,WA",
            Self::WriteThroughNoWriteAllocate => "WT,WN",
            Self::WriteBackNoWriteAllocate => "WB,WN",
        };
        f.pad(s)
    }
}

/// Memory type selected by `TEX:C:B`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryType {
    /// `0b00000`
    StronglyOrdered,
    /// `0b00001`, shareable device.
    Device,
    /// `0b1xxxx`, with independent outer and inner policies.
    Normal {
        /// From `TEX[1:0]`.
        outer: Cacheability,
        /// From `C:B`.
        inner: Cacheability,
    },
}

impl MemoryType {
    /// The raw 5-bit encoding.
    pub const fn bits(self) -> u8 {
        match self {
            Self::StronglyOrdered => 0b00000,
            Self::Device => 0b00001,
            Self::Normal { outer, inner } => 0b10000 | outer.bits() << 2 | inner.bits(),
        }
    }

    /// Human readable description.
    pub fn label(self) -> String {
        match self {
            Self::StronglyOrdered => "Strongly-ordered".to_string(),
            Self::Device => "Device".to_string(),
            Self::Normal { outer, inner } => {
                format!("outer:{} inner:{}", outer.label(), inner.label())
            }
        }
    }
}

impl TryFrom<u8> for MemoryType {
    type Error = DecodeError;

    fn try_from(texcb: u8) -> Result<Self, Self::Error> {
        if texcb & 0b10000 != 0 {
            return Ok(Self::Normal {
                outer: Cacheability::from_bits(texcb >> 2),
                inner: Cacheability::from_bits(texcb),
            });
        }
        match texcb {
            0b00001 => Ok(Self::Device),
            0b00000 => Ok(Self::StronglyOrdered),
            other => Err(DecodeError::MemoryType(other)),
        }
    }
}

/// Short column form used in the range report.
impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StronglyOrdered => f.pad("Strongly-ordered"),
            Self::Device => f.pad("Device"),
            Self::Normal { outer, inner } => f.pad(&format!("O:{outer} I:{inner}")),
        }
    }
}

/// The execute-never bit, rendered as a fixed-width marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExecuteNever(pub bool);

impl fmt::Display for ExecuteNever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(if self.0 { "XN" } else { "  " })
    }
}
