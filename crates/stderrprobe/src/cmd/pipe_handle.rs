use stderrprobe_grammar::{Command, PipeSpec};
use stderrprobe_transport::{handle, AnonymousPipe};

use crate::cmd::pipe::capacity_text;
use crate::cmd::{check_read_count, report_exit, report_read};
use crate::context::ProbeContext;
use crate::exit::ProbeResult;
use crate::launcher;
use crate::report::report;

/// Hand a pipe's write end to a child by descriptor number and read what it
/// writes there.
pub fn run(ctx: &ProbeContext, spec: &PipeSpec) -> ProbeResult<()> {
    check_read_count(ctx, spec.read_count)?;
    let pipe = AnonymousPipe::create(spec.pipe_size)?;
    let capacity = pipe.capacity();
    let (mut reader, writer) = pipe.into_parts();

    let inheritable = handle::duplicate_inheritable(&writer)?;
    drop(writer);

    let child_command = Command::ToHandle {
        handle: inheritable.raw_value()?,
        write_count: spec.write_count,
    };
    let child = launcher::launch(ctx, &child_command.to_string(), None)?;
    // The child holds its own copy now; keeping ours would hide its exit.
    drop(inheritable);

    report!(
        ctx,
        ":pipe-size {} :capacity {} :reading-bytes {}",
        spec.pipe_size,
        capacity_text(capacity),
        spec.read_count
    )?;
    let read = reader.read_once(spec.read_count)?;
    report_read(ctx, &read)?;

    let status = child.wait()?;
    report_exit(ctx, status)
}
