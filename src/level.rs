//! Severity levels attached to log entries.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

/// Every level, ordered from least to most severe.
pub const ALL_LEVELS: [Level; 6] = [
    Level::Trace,
    Level::Debug,
    Level::Info,
    Level::Warn,
    Level::Error,
    Level::Critical,
];

/// Error returned when text does not name a known level.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(String);

impl Level {
    /// Upper-case name used by formatters.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    pub fn parse_or_info(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" | "FATAL" | "PANIC" => Ok(Self::Critical),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("info", Level::Info)]
    #[case("WARNING", Level::Warn)]
    #[case("warn", Level::Warn)]
    #[case("fatal", Level::Critical)]
    #[case("Trace", Level::Trace)]
    fn parses_level_names(#[case] text: &str, #[case] expected: Level) {
        assert_eq!(text.parse::<Level>(), Ok(expected));
    }

    #[rstest]
    fn unknown_level_falls_back_to_info() {
        assert!("verbose".parse::<Level>().is_err());
        assert_eq!(Level::parse_or_info("verbose"), Level::Info);
    }

    #[rstest]
    #[case(log::Level::Trace, Level::Trace)]
    #[case(log::Level::Debug, Level::Debug)]
    #[case(log::Level::Info, Level::Info)]
    #[case(log::Level::Warn, Level::Warn)]
    #[case(log::Level::Error, Level::Error)]
    fn log_levels_map_directly(#[case] level: log::Level, #[case] expected: Level) {
        assert_eq!(Level::from(level), expected);
    }

    #[rstest]
    fn all_levels_are_ordered() {
        assert!(ALL_LEVELS.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
