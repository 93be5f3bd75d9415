use std::sync::PoisonError;

use stderrprobe_grammar::WriteSpec;

use crate::buffering::{self, compose_message, write_counted};
use crate::context::ProbeContext;
use crate::exit::{ProbeError, ProbeResult};
use crate::report::report;

/// Install the requested buffering on stderr and make the measured write.
///
/// Bytes still sitting in a buffer are flushed at teardown, after the
/// `:exiting...` line.
pub fn run(ctx: &ProbeContext, spec: &WriteSpec) -> ProbeResult<()> {
    let stream = buffering::install(spec.buffering)?;
    let message = compose_message(spec);

    report!(ctx, ":writing-bytes {}", message.len())?;
    let wrote = {
        let mut stream = stream.lock().unwrap_or_else(PoisonError::into_inner);
        write_counted(&mut *stream, &message)
    }
    .map_err(|source| ProbeError::io("stderr write", source))?;
    report!(ctx, ":wrote-bytes {wrote}")?;
    report!(ctx, ":exiting...")?;
    Ok(())
}
