use stderrprobe_grammar::Command;

use crate::cmd::{child_args, report_exit};
use crate::context::ProbeContext;
use crate::exit::ProbeResult;
use crate::launcher;

/// Run the `to-stderr` write in a child that shares this process's stderr.
pub fn run(ctx: &ProbeContext, command: &Command) -> ProbeResult<()> {
    let args = child_args(command)?;
    let child = launcher::launch(ctx, &args, None)?;
    let status = child.wait()?;
    report_exit(ctx, status)
}
