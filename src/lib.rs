//! mmumap - ARMv7 MMU map recovery from firmware images
//!
//! Walks the short-descriptor translation tables a firmware leaves in its
//! ROM and reconstructs the virtual-to-physical layout each CPU runs with.
//!
//! # Pipeline
//! - [`mm::walker`] resolves every 1 KiB granule through TTBR0 or TTBR1
//! - [`mm::coalesce`] merges granules into maximal uniform ranges
//! - [`report`] renders ranges as text, outside the engine
//!
//! # Scope
//! - Short-descriptor format only (no LPAE)
//! - Offline, read-only images
//! - TTBR0/TTBR1 split fixed at bit 25

pub mod dump;
pub mod mm;
pub mod report;
pub mod target;

pub use dump::{dump, ranges, run_pass, PassError, PassOutcome, PassStats};
pub use report::{LabelStyle, RenderError, Report};
pub use target::{Target, TargetError};
