use stderrprobe_grammar::PipeSpec;
use stderrprobe_transport::{filler, AnonymousPipe};

use crate::cmd::{check_read_count, report_read};
use crate::context::ProbeContext;
use crate::exit::{ensure, ProbeResult};
use crate::report::report;

/// Write then read an anonymous pipe within this process.
///
/// The write must fit the pipe's capacity or it blocks until the watchdog
/// fires.
pub fn run(ctx: &ProbeContext, spec: &PipeSpec) -> ProbeResult<()> {
    check_read_count(ctx, spec.read_count)?;
    let mut pipe = AnonymousPipe::create(spec.pipe_size)?;
    report!(
        ctx,
        ":pipe-size {} :capacity {} :writing-bytes {}",
        spec.pipe_size,
        capacity_text(pipe.capacity()),
        spec.write_count
    )?;

    let wrote = pipe.writer().write_once(&filler(spec.write_count))?;
    ensure!(wrote == spec.write_count);

    report!(ctx, ":reading-bytes {}", spec.read_count)?;
    let read = pipe.reader().read_once(spec.read_count)?;
    report_read(ctx, &read)
}

pub(crate) fn capacity_text(capacity: Option<usize>) -> String {
    capacity.map_or_else(|| "unknown".to_string(), |bytes| bytes.to_string())
}
