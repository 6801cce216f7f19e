//! Text Rendering of Recovered Maps
//!
//! One line per merged range:
//!
//! ```text
//! 00001000-00001FFF -> E0008000-E0008FFF (+E0007000) Device           P:RW
//! ```
//!
//! Columns are the virtual range, the physical range, the signed
//! physical-minus-virtual offset, memory type, access permission and the
//! execute-never marker. CPU and TTBR headers frame each pass.
//!
//! [`LabelStyle::Long`] spells the attributes out instead:
//!
//! ```text
//! 00001000-00001FFF -> E0008000-E0008FFF (+E0007000) Device, privileged read-write
//! ```

use std::io::{self, Write};

use thiserror::Error;

use crate::mm::{DecodeError, MergedRange, TableIndex};

/// Errors raised while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to write report")]
    Io(#[from] io::Error),
}

/// How the attribute columns of a range line are spelled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LabelStyle {
    /// Fixed-width short forms such as `P:RW` and `O:WB,WA I:WB,WN`.
    #[default]
    Compact,
    /// Descriptive labels separated by commas.
    Long,
}

/// Format a signed offset as `+HEX` or `-HEX`, right-aligned to 5 columns.
pub fn signed_hex(offset: i64) -> String {
    let sign = if offset < 0 { '-' } else { '+' };
    format!("{:>5}", format!("{sign}{:X}", offset.unsigned_abs()))
}

/// Render one range as a compact report line, without a trailing newline.
pub fn format_range(range: &MergedRange) -> Result<String, DecodeError> {
    format_range_with(range, LabelStyle::Compact)
}

/// Render one range in the given label style.
pub fn format_range_with(range: &MergedRange, style: LabelStyle) -> Result<String, DecodeError> {
    let memory_type = range.memory_type()?;
    let access = range.access()?;
    let span = format!(
        "{:08X}-{:08X} -> {:08X}-{:08X} ({})",
        range.virt_start.as_u32(),
        range.virt_end(),
        range.phys_start.as_u64(),
        range.phys_end(),
        signed_hex(range.offset()),
    );
    Ok(match style {
        LabelStyle::Compact => format!(
            "{span} {:<16} {:<4} {}",
            memory_type,
            access,
            range.execute_never()
        ),
        LabelStyle::Long => {
            let xn = if range.execute_never().0 { ", execute-never" } else { "" };
            format!("{span} {}, {}{xn}", memory_type.label(), access.label())
        }
    })
}

/// Line-oriented report writer.
pub struct Report<W: Write> {
    out: W,
    style: LabelStyle,
}

impl<W: Write> Report<W> {
    pub fn new(out: W) -> Self {
        Self::with_style(out, LabelStyle::Compact)
    }

    pub fn with_style(out: W, style: LabelStyle) -> Self {
        Self { out, style }
    }

    /// Header opening the passes of one CPU.
    pub fn cpu_header(&mut self, cpu: usize) -> io::Result<()> {
        writeln!(self.out, "CPU{cpu}")
    }

    /// Header opening one root's pass.
    pub fn table_header(&mut self, table: TableIndex, ttbr: u32) -> io::Result<()> {
        writeln!(self.out, "{table}: {ttbr:08X}")?;
        writeln!(self.out, "===============")
    }

    /// One merged range. Nothing is written if its attributes do not decode.
    pub fn range(&mut self, range: &MergedRange) -> Result<(), RenderError> {
        let line = format_range_with(range, self.style)?;
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    /// Blank line closing a CPU.
    pub fn cpu_footer(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::{Attributes, PhysAddr, VirtAddr};

    fn range(virt: u32, phys: u64, size: u64, attrs: Attributes) -> MergedRange {
        MergedRange {
            virt_start: VirtAddr::new(virt),
            phys_start: PhysAddr::new(phys),
            size,
            attrs,
        }
    }

    #[test]
    fn test_signed_hex() {
        assert_eq!(signed_hex(0), "   +0");
        assert_eq!(signed_hex(0x1000), "+1000");
        assert_eq!(signed_hex(-0x20), "  -20");
        assert_eq!(signed_hex(0xE000_7000), "+E0007000");
    }

    #[test]
    fn test_format_device_line() {
        let r = range(0x1000, 0xE000_8000, 0x1000, Attributes::new(0b001, 0b00001, false));
        assert_eq!(
            format_range(&r).expect("decode"),
            "00001000-00001FFF -> E0008000-E0008FFF (+E0007000) Device           P:RW   "
        );
    }

    #[test]
    fn test_format_normal_xn_line() {
        let r = range(0xF000_0000, 0xF000_0000, 0x10_0000, Attributes::new(0b101, 0b10101, true));
        assert_eq!(
            format_range(&r).expect("decode"),
            "F0000000-F00FFFFF -> F0000000-F00FFFFF (   +0) O:WB,WA I:WB,WA  P:R  XN"
        );
    }

    #[test]
    fn test_format_long_labels() {
        let r = range(0x1000, 0xE000_8000, 0x1000, Attributes::new(0b001, 0b00001, false));
        assert_eq!(
            format_range_with(&r, LabelStyle::Long).expect("decode"),
            "00001000-00001FFF -> E0008000-E0008FFF (+E0007000) Device, privileged read-write"
        );
        let r = range(0xF000_0000, 0xF000_0000, 0x10_0000, Attributes::new(0b101, 0b10110, true));
        assert_eq!(
            format_range_with(&r, LabelStyle::Long).expect("decode"),
            "F0000000-F00FFFFF -> F0000000-F00FFFFF (   +0) \
             outer:write-back write-allocate inner:write-through no-write-allocate, \
             privileged read-only, execute-never"
        );
    }

    #[test]
    fn test_report_uses_its_label_style() {
        let r = range(0x1000, 0x1000, 0x400, Attributes::new(0b011, 0b00000, true));
        let mut report = Report::with_style(Vec::new(), LabelStyle::Long);
        report.range(&r).expect("render");
        let text = String::from_utf8(report.into_inner()).expect("utf8");
        assert_eq!(
            text,
            "00001000-000013FF -> 00001000-000013FF (   +0) Strongly-ordered, read-write, execute-never\n"
        );
    }

    #[test]
    fn test_format_rejects_reserved_attributes() {
        let r = range(0, 0, 0x400, Attributes::new(0b000, 0b00001, false));
        assert_eq!(format_range(&r), Err(DecodeError::AccessPermission(0)));
        let r = range(0, 0, 0x400, Attributes::new(0b001, 0b00100, false));
        assert_eq!(format_range(&r), Err(DecodeError::MemoryType(0b00100)));
    }

    #[test]
    fn test_report_headers() {
        let mut report = Report::new(Vec::new());
        report.cpu_header(1).expect("write");
        report.table_header(TableIndex::Ttbr0, 0xE000_4880).expect("write");
        report.cpu_footer().expect("write");
        let text = String::from_utf8(report.into_inner()).expect("utf8");
        assert_eq!(text, "CPU1\nTTBR0: E0004880\n===============\n\n");
    }

    #[test]
    fn test_report_skips_undecodable_range() {
        let mut report = Report::new(Vec::new());
        let bad = range(0, 0, 0x400, Attributes::new(0b111, 0b00001, false));
        assert!(matches!(report.range(&bad), Err(RenderError::Decode(_))));
        assert!(report.into_inner().is_empty());
    }
}
