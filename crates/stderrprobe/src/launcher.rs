use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use stderrprobe_transport::Endpoint;
use tracing::{debug, warn};

use crate::context::ProbeContext;
use crate::sync::SYNC_ENV;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("cannot locate the probe executable: {0}")]
    CurrentExe(#[source] io::Error),

    #[error("command line of {len} bytes does not fit the limit of {max}: {command_line}")]
    CommandLineTooLong {
        command_line: String,
        len: usize,
        max: usize,
    },

    #[error("failed to spawn `{command_line}`: {source}")]
    Spawn {
        command_line: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for child {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// A running child probe. Must be waited; dropping it kills the child.
#[derive(Debug)]
pub struct ChildHandle {
    child: Option<Child>,
    pid: u32,
}

impl ChildHandle {
    pub fn wait(mut self) -> Result<ExitStatus, LaunchError> {
        let pid = self.pid;
        let Some(mut child) = self.child.take() else {
            return Err(LaunchError::Wait {
                pid,
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        };
        let status = child
            .wait()
            .map_err(|source| LaunchError::Wait { pid, source })?;
        debug!(pid, %status, "child exited");
        Ok(status)
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(pid = self.pid, "child was never waited; killing it");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Start a copy of this executable running `child_args`.
///
/// With `stderr`, the child's standard error is that endpoint and the
/// parent's copy is closed once the child exists; stdin and stdout are
/// always inherited.
pub fn launch(
    ctx: &ProbeContext,
    child_args: &str,
    stderr: Option<Endpoint>,
) -> Result<ChildHandle, LaunchError> {
    let exe = std::env::current_exe().map_err(LaunchError::CurrentExe)?;
    let command_line = compose_command_line(&exe, child_args, ctx.config().max_command_line)?;
    debug!(%command_line, redirected = stderr.is_some(), "launching child");

    let mut command = Command::new(&exe);
    command
        .args(child_args.split(' ').filter(|word| !word.is_empty()))
        .env(SYNC_ENV, ctx.sync().as_str())
        .envs(ctx.config().child_env())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit());
    if let Some(endpoint) = stderr {
        command.stderr(endpoint.into_stdio());
    }

    let child = command.spawn().map_err(|source| LaunchError::Spawn {
        command_line: command_line.clone(),
        source,
    })?;
    // Dropping the builder closes the parent's copy of the redirected end.
    drop(command);

    let pid = child.id();
    debug!(pid, "child started");
    Ok(ChildHandle {
        child: Some(child),
        pid,
    })
}

/// `exe + " " + args`, provided it is shorter than `max` bytes.
pub fn compose_command_line(exe: &Path, args: &str, max: usize) -> Result<String, LaunchError> {
    let command_line = format!("{} {args}", exe.display());
    let len = command_line.len();
    if len >= max {
        return Err(LaunchError::CommandLineTooLong {
            command_line,
            len,
            max,
        });
    }
    Ok(command_line)
}

/// `:child-exited` payload: the exit code, or the terminating signal.
pub fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return code.to_string();
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return format!("signal {signal}");
        }
    }
    status.to_string()
}
