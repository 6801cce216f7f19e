//! Map Recovery Passes
//!
//! A pass is one walk of one root of one CPU, streamed through a fresh
//! [`Coalescer`]. Passes never share state, so a failed pass does not
//! affect the others; its partial output stays in the report and the
//! failure is returned in its [`PassOutcome`].

use std::io::{self, Write};

use log::{info, warn};
use thiserror::Error;

use crate::mm::{Coalescer, MergedRange, RomImage, TableIndex, TableWalker, TtbrPair, WalkError};
use crate::report::{RenderError, Report};

/// Why a pass was aborted.
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Counters for a completed pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Granules that resolved.
    pub entries: usize,
    /// Merged ranges emitted.
    pub ranges: usize,
}

/// Result of one pass.
#[derive(Debug)]
pub struct PassOutcome {
    pub cpu: usize,
    pub table: TableIndex,
    pub ttbr: u32,
    pub result: Result<PassStats, PassError>,
}

/// Walk one root and hand each merged range to `sink`, in ascending
/// virtual order.
pub fn run_pass<F, E>(
    image: &RomImage,
    ttbrs: TtbrPair,
    table: TableIndex,
    mut sink: F,
) -> Result<PassStats, E>
where
    F: FnMut(MergedRange) -> Result<(), E>,
    E: From<WalkError>,
{
    let mut stats = PassStats::default();
    let mut coalescer = Coalescer::new();

    for entry in TableWalker::new(image, ttbrs).walk(table) {
        let entry = entry?;
        stats.entries += 1;
        if let Some(range) = coalescer.push(&entry) {
            sink(range)?;
            stats.ranges += 1;
        }
    }
    if let Some(range) = coalescer.finish() {
        sink(range)?;
        stats.ranges += 1;
    }
    Ok(stats)
}

/// Collect the merged ranges of one root.
pub fn ranges(
    image: &RomImage,
    ttbrs: TtbrPair,
    table: TableIndex,
) -> Result<Vec<MergedRange>, WalkError> {
    let mut out = Vec::new();
    run_pass(image, ttbrs, table, |range| {
        out.push(range);
        Ok::<_, WalkError>(())
    })?;
    Ok(out)
}

/// Run every pass for the given CPUs, writing the report as it goes.
///
/// Only a failure to write the report is returned as an error; walk and
/// decode failures end their own pass and are reported per outcome.
pub fn dump<W: Write>(
    image: &RomImage,
    cpus: &[(usize, TtbrPair)],
    report: &mut Report<W>,
) -> io::Result<Vec<PassOutcome>> {
    let mut outcomes = Vec::with_capacity(cpus.len() * TableIndex::ALL.len());

    for &(cpu, ttbrs) in cpus {
        report.cpu_header(cpu)?;
        for table in TableIndex::ALL {
            let ttbr = ttbrs.get(table);
            report.table_header(table, ttbr)?;

            let result = run_pass(image, ttbrs, table, |range| {
                report.range(&range).map_err(PassError::from)
            });
            let result = match result {
                Err(PassError::Render(RenderError::Io(err))) => return Err(err),
                other => other,
            };

            match &result {
                Ok(stats) => info!(
                    "CPU{cpu} {table} {ttbr:08X}: {} granules, {} ranges",
                    stats.entries, stats.ranges
                ),
                Err(err) => warn!("CPU{cpu} {table} {ttbr:08X}: pass aborted: {err}"),
            }
            outcomes.push(PassOutcome {
                cpu,
                table,
                ttbr,
                result,
            });
        }
        report.cpu_footer()?;
    }

    Ok(outcomes)
}
