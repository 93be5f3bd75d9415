use stderrprobe_grammar::Command;

use crate::context::ProbeContext;
use crate::exit::{ensure, ProbeError, ProbeResult};
use crate::launcher::describe_status;
use crate::report::report;

pub mod pipe;
pub mod pipe_handle;
pub mod pipe_to_child;
pub mod sock_to_child;
pub mod to_child_stderr;
pub mod to_handle;
pub mod to_stderr;

pub fn run(command: &Command, ctx: &ProbeContext) -> ProbeResult<()> {
    match command {
        Command::ToStderr(spec) => to_stderr::run(ctx, spec),
        Command::ToChildStderr(_) => to_child_stderr::run(ctx, command),
        Command::Pipe(spec) => pipe::run(ctx, spec),
        Command::PipeHandleToChild(spec) => pipe_handle::run(ctx, spec),
        Command::ToHandle {
            handle,
            write_count,
        } => to_handle::run(ctx, *handle, *write_count),
        Command::PipeToChildStderr {
            pipe_size,
            read_count,
            ..
        } => pipe_to_child::run(ctx, command, *pipe_size, *read_count),
        Command::SockToChildStderr { read_count, .. } => {
            sock_to_child::run(ctx, command, *read_count)
        }
    }
}

/// Command line of the `to-stderr` child that `command` launches.
fn child_args(command: &Command) -> ProbeResult<String> {
    let child = command.child_command();
    ensure!(child.is_some());
    Ok(child.map(|child| child.to_string()).unwrap_or_default())
}

fn check_read_count(ctx: &ProbeContext, requested: usize) -> ProbeResult<()> {
    let limit = ctx.config().max_read_count;
    if requested > limit {
        return Err(ProbeError::ReadTooLarge { requested, limit });
    }
    Ok(())
}

/// The grammar's exclusive write bound, applied to counts it does not check.
fn check_write_count(ctx: &ProbeContext, requested: usize) -> ProbeResult<()> {
    let limit = ctx.config().limits.max_write_count;
    if requested >= limit {
        return Err(ProbeError::WriteTooLarge { requested, limit });
    }
    Ok(())
}

fn report_read(ctx: &ProbeContext, read: &[u8]) -> ProbeResult<()> {
    report!(
        ctx,
        ":read-bytes {} :read-chars {}",
        read.len(),
        String::from_utf8_lossy(read)
    )?;
    Ok(())
}

fn report_exit(ctx: &ProbeContext, status: std::process::ExitStatus) -> ProbeResult<()> {
    report!(ctx, ":child-exited {}", describe_status(status))?;
    Ok(())
}
