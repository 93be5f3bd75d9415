use stderrprobe_grammar::Command;
use stderrprobe_transport::AnonymousPipe;

use crate::cmd::pipe::capacity_text;
use crate::cmd::{check_read_count, child_args, report_exit, report_read};
use crate::context::ProbeContext;
use crate::exit::ProbeResult;
use crate::launcher;
use crate::report::report;

/// Bind a child's stderr to a pipe and read what its buffered write
/// delivers.
pub fn run(
    ctx: &ProbeContext,
    command: &Command,
    pipe_size: usize,
    read_count: usize,
) -> ProbeResult<()> {
    check_read_count(ctx, read_count)?;
    let args = child_args(command)?;
    let pipe = AnonymousPipe::create(pipe_size)?;
    let capacity = pipe.capacity();
    let (mut reader, writer) = pipe.into_parts();

    let child = launcher::launch(ctx, &args, Some(writer))?;

    report!(
        ctx,
        ":pipe-size {pipe_size} :capacity {} :reading-bytes {read_count}",
        capacity_text(capacity)
    )?;
    let read = reader.read_once(read_count)?;
    report_read(ctx, &read)?;

    let status = child.wait()?;
    report_exit(ctx, status)
}
