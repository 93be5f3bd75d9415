use std::time::Duration;

use clap::ValueEnum;
use stderrprobe_grammar::Limits;

use crate::logging::{LogFormat, LogLevel};
use crate::report::OutputFormat;

pub const ENV_FORMAT: &str = "STDERRPROBE_FORMAT";
pub const ENV_LOG_FORMAT: &str = "STDERRPROBE_LOG_FORMAT";
pub const ENV_LOG_LEVEL: &str = "STDERRPROBE_LOG_LEVEL";
pub const ENV_WATCHDOG_MS: &str = "STDERRPROBE_WATCHDOG_MS";
pub const ENV_MAX_WRITE_COUNT: &str = "STDERRPROBE_MAX_WRITE_COUNT";
pub const ENV_MAX_BUFFER_SIZE: &str = "STDERRPROBE_MAX_BUFFER_SIZE";
pub const ENV_MAX_READ_COUNT: &str = "STDERRPROBE_MAX_READ_COUNT";
pub const ENV_MAX_COMMAND_LINE: &str = "STDERRPROBE_MAX_COMMAND_LINE";

pub const DEFAULT_WATCHDOG_MS: u64 = 2000;
pub const DEFAULT_MAX_READ_COUNT: usize = 1 << 20;
pub const DEFAULT_MAX_COMMAND_LINE: usize = 1024;

/// Effective settings of one probe process.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub limits: Limits,
    /// Root watchdog interval; children run on half of it.
    pub watchdog: Duration,
    pub max_read_count: usize,
    pub max_command_line: usize,
    pub format: OutputFormat,
    pub log_format: LogFormat,
    pub log_level: LogLevel,
}

impl ProbeConfig {
    /// Environment a child needs to run with the same settings.
    pub fn child_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_FORMAT, value_name(self.format)),
            (ENV_LOG_FORMAT, value_name(self.log_format)),
            (ENV_LOG_LEVEL, value_name(self.log_level)),
            (ENV_WATCHDOG_MS, self.watchdog.as_millis().to_string()),
            (ENV_MAX_WRITE_COUNT, self.limits.max_write_count.to_string()),
            (ENV_MAX_BUFFER_SIZE, self.limits.max_buffer_size.to_string()),
            (ENV_MAX_READ_COUNT, self.max_read_count.to_string()),
            (ENV_MAX_COMMAND_LINE, self.max_command_line.to_string()),
        ]
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            watchdog: Duration::from_millis(DEFAULT_WATCHDOG_MS),
            max_read_count: DEFAULT_MAX_READ_COUNT,
            max_command_line: DEFAULT_MAX_COMMAND_LINE,
            format: OutputFormat::Text,
            log_format: LogFormat::Text,
            log_level: LogLevel::Warn,
        }
    }
}

fn value_name<T: ValueEnum>(value: T) -> String {
    value
        .to_possible_value()
        .map(|possible| possible.get_name().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_env_forwards_every_setting() {
        let config = ProbeConfig {
            format: OutputFormat::Json,
            log_level: LogLevel::Debug,
            watchdog: Duration::from_millis(750),
            ..ProbeConfig::default()
        };
        let env = config.child_env();
        let get = |key: &str| {
            env.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.as_str())
        };

        assert_eq!(env.len(), 8);
        assert_eq!(get(ENV_FORMAT), Some("json"));
        assert_eq!(get(ENV_LOG_FORMAT), Some("text"));
        assert_eq!(get(ENV_LOG_LEVEL), Some("debug"));
        assert_eq!(get(ENV_WATCHDOG_MS), Some("750"));
        assert_eq!(get(ENV_MAX_WRITE_COUNT), Some("5000"));
        assert_eq!(get(ENV_MAX_BUFFER_SIZE), Some("4096"));
        assert_eq!(get(ENV_MAX_READ_COUNT), Some("1048576"));
        assert_eq!(get(ENV_MAX_COMMAND_LINE), Some("1024"));
    }
}
