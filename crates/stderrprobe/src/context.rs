use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use stderrprobe_transport::StreamKind;
use tracing::debug;

use crate::buffering;
use crate::config::ProbeConfig;
use crate::report::Reporter;
use crate::sync::{SyncError, SyncIdentity, SyncLock};

/// Position of this process in the probe tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Root,
    Child,
}

impl Role {
    pub fn tag(self) -> &'static str {
        match self {
            Role::Root => "PARNT",
            Role::Child => "CHILD",
        }
    }

    /// A child gives up first so its parent can still report the outcome.
    pub fn watchdog_interval(self, base: Duration) -> Duration {
        match self {
            Role::Root => base,
            Role::Child => base / 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Everything a scenario needs from its process, built once in `main`.
#[derive(Debug)]
pub struct ProbeContext {
    role: Role,
    stream: StreamKind,
    sync: SyncIdentity,
    reporter: Arc<Reporter>,
    config: ProbeConfig,
}

impl ProbeContext {
    /// Determine the role from the inherited sync payload and open the
    /// shared lock accordingly.
    pub fn establish(config: ProbeConfig) -> Result<Self, SyncError> {
        let stream = StreamKind::of_stderr();
        let (role, sync, lock) = match SyncIdentity::inherited() {
            Some(sync) => {
                let lock = SyncLock::open(&sync)?;
                (Role::Child, sync, lock)
            }
            None => {
                let sync = SyncIdentity::fresh(std::process::id());
                let lock = SyncLock::create(&sync)?;
                (Role::Root, sync, lock)
            }
        };
        let reporter = Arc::new(Reporter::new(lock, stream.symbol(), role, config.format));
        Ok(Self {
            role,
            stream,
            sync,
            reporter,
            config,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn sync(&self) -> &SyncIdentity {
        &self.sync
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn watchdog_interval(&self) -> Duration {
        self.role.watchdog_interval(self.config.watchdog)
    }

    pub fn report(&self, message: fmt::Arguments<'_>) -> Result<(), SyncError> {
        self.reporter.report(message)
    }

    /// Flush the stream under test and drop the lock file if it is ours.
    pub fn teardown(&self) {
        debug!(role = %self.role, stream = %self.stream, "teardown");
        buffering::flush_installed();
        self.reporter.release_sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_tag_reports() {
        assert_eq!(Role::Root.tag(), "PARNT");
        assert_eq!(Role::Child.to_string(), "CHILD");
    }

    #[test]
    fn child_watchdog_runs_on_half_the_interval() {
        let base = Duration::from_millis(2000);
        assert_eq!(Role::Root.watchdog_interval(base), base);
        assert_eq!(
            Role::Child.watchdog_interval(base),
            Duration::from_millis(1000)
        );
    }
}
