mod buffering;
mod cmd;
mod config;
mod context;
mod exit;
mod launcher;
mod logging;
mod report;
mod sync;
mod watchdog;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use stderrprobe_grammar::{CommandKind, GrammarError, Limits, ParsedArguments};
use tracing::debug;

use crate::config::ProbeConfig;
use crate::context::ProbeContext;
use crate::exit::ProbeError;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::report::{report, OutputFormat};

const PROGRAM: &str = "stderrprobe";

#[derive(Parser, Debug)]
#[command(
    name = "stderrprobe",
    version,
    about = "Probe how stderr buffering behaves across pipes, inherited handles and sockets"
)]
struct Cli {
    /// Report line format (stdout).
    #[arg(long, value_name = "FORMAT", env = "STDERRPROBE_FORMAT", default_value = "text")]
    format: OutputFormat,

    /// Log output format (stdout, interleaved with reports).
    #[arg(
        long,
        value_name = "FORMAT",
        env = "STDERRPROBE_LOG_FORMAT",
        default_value = "text"
    )]
    log_format: LogFormat,

    /// Minimum log level.
    #[arg(
        long,
        value_name = "LEVEL",
        env = "STDERRPROBE_LOG_LEVEL",
        default_value = "warn"
    )]
    log_level: LogLevel,

    /// Exit with status 99 after this long; children use half of it.
    #[arg(
        long,
        value_name = "MS",
        env = "STDERRPROBE_WATCHDOG_MS",
        default_value_t = config::DEFAULT_WATCHDOG_MS,
        value_parser = clap::value_parser!(u64).range(2..)
    )]
    watchdog_ms: u64,

    /// Exclusive upper bound for write counts.
    #[arg(
        long,
        value_name = "N",
        env = "STDERRPROBE_MAX_WRITE_COUNT",
        default_value_t = Limits::DEFAULT_MAX_WRITE_COUNT
    )]
    max_write_count: usize,

    /// Exclusive upper bound for stderr buffer sizes.
    #[arg(
        long,
        value_name = "N",
        env = "STDERRPROBE_MAX_BUFFER_SIZE",
        default_value_t = Limits::DEFAULT_MAX_BUFFER_SIZE
    )]
    max_buffer_size: usize,

    /// Largest single read a scenario may request.
    #[arg(
        long,
        value_name = "N",
        env = "STDERRPROBE_MAX_READ_COUNT",
        default_value_t = config::DEFAULT_MAX_READ_COUNT
    )]
    max_read_count: usize,

    /// Longest child command line, in bytes.
    #[arg(
        long,
        value_name = "N",
        env = "STDERRPROBE_MAX_COMMAND_LINE",
        default_value_t = config::DEFAULT_MAX_COMMAND_LINE
    )]
    max_command_line: usize,

    /// Probe command, e.g. `to-stderr write 5 lnbuf 10`.
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    tokens: Vec<String>,
}

impl Cli {
    fn config(&self) -> ProbeConfig {
        ProbeConfig {
            limits: Limits {
                max_write_count: self.max_write_count,
                max_buffer_size: self.max_buffer_size,
            },
            watchdog: Duration::from_millis(self.watchdog_ms),
            max_read_count: self.max_read_count,
            max_command_line: self.max_command_line,
            format: self.format,
            log_format: self.log_format,
            log_level: self.log_level,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let config = cli.config();
    let parsed = match ParsedArguments::parse(&cli.tokens, &config.limits) {
        Ok(parsed) => parsed,
        Err(err) => {
            print_grammar_error(&err);
            std::process::exit(exit::USAGE);
        }
    };

    std::process::exit(run(&parsed, config));
}

fn run(parsed: &ParsedArguments, config: ProbeConfig) -> i32 {
    let ctx = match ProbeContext::establish(config) {
        Ok(ctx) => ctx,
        Err(err) => {
            // No lock, so no reporter: say it unsynchronized.
            println!("{}", ProbeError::from(err).diagnostic());
            std::process::abort();
        }
    };
    init_logging(
        ctx.config().log_format,
        ctx.config().log_level,
        Arc::clone(ctx.reporter()),
    );
    debug!(
        role = %ctx.role(),
        stream = %ctx.stream(),
        sync = %ctx.sync(),
        "probe context established"
    );

    if let Err(err) = watchdog::start(Arc::clone(ctx.reporter()), ctx.watchdog_interval()) {
        fatal(&ctx, &ProbeError::io("watchdog thread", err));
    }
    if let Err(err) = ctx.reporter().announce(parsed.tokens()) {
        fatal(&ctx, &err.into());
    }

    match cmd::run(parsed.command(), &ctx) {
        Ok(()) => {
            ctx.teardown();
            exit::SUCCESS
        }
        Err(err) => fatal(&ctx, &err),
    }
}

fn fatal(ctx: &ProbeContext, err: &ProbeError) -> ! {
    let diagnostic = err.diagnostic();
    if report!(ctx, "{diagnostic}").is_err() {
        println!("{diagnostic}");
    }
    ctx.reporter().release_sync();
    std::process::abort()
}

fn print_grammar_error(err: &GrammarError) {
    eprintln!("{PROGRAM} {err}");
    if err.command().is_none() {
        eprintln!("\noptions:");
        for kind in CommandKind::ALL {
            if kind != CommandKind::ToHandle {
                eprintln!("\t{}", kind.synopsis());
            }
        }
    }
}
