use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use stderrprobe_grammar::Command;
use stderrprobe_transport::{ReadSocket, SocketProvider};
use tracing::debug;

use crate::cmd::{check_read_count, child_args, report_exit, report_read};
use crate::context::ProbeContext;
use crate::exit::{ProbeError, ProbeResult};
use crate::launcher;
use crate::report::report;

/// Bind a child's stderr to a loopback socket and read from the other end
/// on a second thread.
pub fn run(ctx: &ProbeContext, command: &Command, read_count: usize) -> ProbeResult<()> {
    check_read_count(ctx, read_count)?;
    let args = child_args(command)?;

    let provider = SocketProvider::select_handle_capable()?;
    report!(ctx, ":socket-provider-IFS-selected {}", provider.name)?;

    relay(ctx, &provider, &args, read_count)
}

fn relay(
    ctx: &ProbeContext,
    provider: &SocketProvider,
    args: &str,
    read_count: usize,
) -> ProbeResult<()> {
    let read_socket = ReadSocket::bind_loopback()?;
    let addr = read_socket.local_addr();
    let abandoned = AtomicBool::new(false);

    thread::scope(|scope| -> ProbeResult<()> {
        let reader = thread::Builder::new()
            .name("socket-reader".to_string())
            .spawn_scoped(scope, || read_once(ctx, &read_socket, read_count, &abandoned))
            .map_err(|source| ProbeError::io("socket reader thread", source))?;

        if let Err(err) = drive_child(ctx, provider, addr, args) {
            // The scope joins the reader, which is still parked in accept.
            abandoned.store(true, Ordering::SeqCst);
            wake_reader(addr);
            return Err(err);
        }

        reader.join().map_err(|_| ProbeError::ReaderPanicked)?
    })
}

fn drive_child(
    ctx: &ProbeContext,
    provider: &SocketProvider,
    addr: SocketAddr,
    args: &str,
) -> ProbeResult<()> {
    let write_socket = provider.connect(addr)?;
    let child = launcher::launch(ctx, args, Some(write_socket))?;
    let status = child.wait()?;
    report_exit(ctx, status)
}

fn wake_reader(addr: SocketAddr) {
    if let Err(err) = TcpStream::connect(addr) {
        debug!(%addr, %err, "could not wake socket reader");
    }
}

fn read_once(
    ctx: &ProbeContext,
    socket: &ReadSocket,
    read_count: usize,
    abandoned: &AtomicBool,
) -> ProbeResult<()> {
    let mut stream = socket.accept()?;
    if abandoned.load(Ordering::SeqCst) {
        debug!("setup failed, socket reader stands down");
        return Ok(());
    }
    debug!(read_count, "reading from accepted socket");
    report!(ctx, ":reading-bytes {read_count}")?;
    let read = stream.read_once(read_count)?;
    report_read(ctx, &read)
}
