use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::buffering;
use crate::exit;
use crate::report::{report, Reporter};

/// Start the thread that ends this process after `interval`.
///
/// Blocking reads and writes have no timeout of their own; this is what
/// ends a scenario that never completes.
pub fn start(reporter: Arc<Reporter>, interval: Duration) -> io::Result<()> {
    thread::Builder::new()
        .name("stderrprobe-watchdog".to_string())
        .spawn(move || {
            thread::sleep(interval);
            expire(&reporter, interval)
        })?;
    Ok(())
}

fn expire(reporter: &Reporter, interval: Duration) -> ! {
    let _ = report!(reporter, ":killing-after-inactivity-ms {}", interval.as_millis());
    buffering::try_flush_installed();
    reporter.release_sync();
    std::process::exit(exit::WATCHDOG)
}
