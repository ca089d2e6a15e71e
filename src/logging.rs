use std::{env, fmt};

use chrono::Local;
use colored::{ColoredString, Colorize};
use fern::{Dispatch, FormatCallback};
use log::{Level, LevelFilter, Record, SetLoggerError};

/// Decides which records reach the output.
/// Other crates only get to report warnings and errors.
#[derive(Debug, Clone, Copy)]
struct LogPolicy {
    local: LevelFilter,
}

impl LogPolicy {
    fn from_env() -> Self {
        let local = match env::var("TUNELINK_LOG_LEVEL") {
            Ok(level) if level.trim().eq_ignore_ascii_case("debug") => LevelFilter::Debug,
            _ => LevelFilter::Info,
        };

        Self { local }
    }

    fn allows(&self, target: &str, level: Level) -> bool {
        match Target::from_str(target) {
            Target::External(_) => level <= Level::Warn,
            _ => level <= self.local,
        }
    }
}

pub fn init_logger() -> Result<(), SetLoggerError> {
    let policy = LogPolicy::from_env();

    Dispatch::new()
        .format(write_line)
        .filter(move |meta| policy.allows(meta.target(), meta.level()))
        .chain(std::io::stdout())
        .apply()
}

fn write_line(out: FormatCallback, message: &fmt::Arguments, record: &Record) {
    let time = Local::now().format("%H:%M:%S").to_string();

    out.finish(format_args!(
        "{:^5} {} {:^8} {}",
        badge(record.level()),
        time.bright_black(),
        Target::from_str(record.target()),
        message
    ))
}

#[derive(Debug, PartialEq, Eq)]
enum Target {
    External(String),
    Server,
    Collab,
    Core,
    Bot,
}

impl Target {
    fn from_str(target: &str) -> Self {
        let krate = target.split("::").next().unwrap_or_default();

        match krate {
            "tunelink" => Self::Bot,
            "tunelink_core" => Self::Core,
            "tunelink_collab" => Self::Collab,
            "tunelink_server" => Self::Server,
            other => Self::External(other.to_string()),
        }
    }

    fn label(&self) -> ColoredString {
        match self {
            Self::External(name) => name.as_str().clear(),
            Self::Bot => "BOT".bright_cyan(),
            Self::Core => "CORE".blue(),
            Self::Collab => "COLLAB".bright_purple(),
            Self::Server => "SERVER".bright_green(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.label(), f)
    }
}

fn badge(level: Level) -> ColoredString {
    match level {
        Level::Error => " ERR ".black().on_red().bold(),
        Level::Warn => " WRN ".black().on_yellow().bold(),
        Level::Info => " INF ".black().on_blue().bold(),
        Level::Debug => " DBG ".white().on_black(),
        Level::Trace => " TRC ".normal(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_targets() {
        assert_eq!(Target::from_str("tunelink_core::dispatch"), Target::Core);
        assert_eq!(Target::from_str("tunelink_collab::jobs"), Target::Collab);
        assert_eq!(Target::from_str("tunelink_server"), Target::Server);
        assert_eq!(Target::from_str("tunelink::bot::commands"), Target::Bot);
        assert_eq!(
            Target::from_str("sqlx::query"),
            Target::External("sqlx".to_string())
        );
    }

    #[test]
    fn test_policy() {
        let quiet = LogPolicy {
            local: LevelFilter::Info,
        };
        let verbose = LogPolicy {
            local: LevelFilter::Debug,
        };

        assert!(quiet.allows("tunelink_collab::jobs", Level::Info));
        assert!(!quiet.allows("tunelink_collab::jobs", Level::Debug));
        assert!(verbose.allows("tunelink_collab::jobs", Level::Debug));
        assert!(!verbose.allows("tunelink::bot", Level::Trace));

        assert!(quiet.allows("sqlx::query", Level::Warn));
        assert!(!verbose.allows("sqlx::query", Level::Info));
    }
}
