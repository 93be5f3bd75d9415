use stderrprobe_transport::{filler, handle};

use crate::cmd::check_write_count;
use crate::context::ProbeContext;
use crate::exit::ProbeResult;
use crate::report::report;

/// Child side of `pipe-handle-to-child`: one write to an inherited handle.
pub fn run(ctx: &ProbeContext, raw: u64, write_count: usize) -> ProbeResult<()> {
    check_write_count(ctx, write_count)?;
    // SAFETY: the parent duplicated this descriptor for us and passed its
    // number on our command line; nothing else in this process owns it.
    let mut endpoint = unsafe { handle::adopt(raw) }?;

    report!(ctx, ":handle {raw} :writing-bytes {write_count}")?;
    let wrote = endpoint.write_once(&filler(write_count))?;
    report!(ctx, ":wrote-bytes {wrote}")?;
    report!(ctx, ":exiting...")?;
    Ok(())
}
