//! Compatibility bridge for the Rust `log` crate.
//!
//! [`HookLogger`] implements `log::Log` by converting each record into a
//! [`LogEntry`] and firing it through a shared [`Hook`]. Records from this
//! crate's own diagnostics are skipped so delivery failures never feed back
//! into the hook.

use std::sync::Arc;

use log::{LevelFilter, Metadata, Record, SetLoggerError};

use crate::{entry::LogEntry, hook::Hook, is_own_target, level::Level};

/// Adapter implementing the Rust `log::Log` trait on top of a [`Hook`].
#[derive(Clone, Debug)]
pub struct HookLogger {
    hook: Arc<Hook>,
}

fn to_entry(record: &Record<'_>) -> LogEntry {
    let mut entry = LogEntry::new(Level::from(record.level()), record.args().to_string())
        .with_logger(record.target());
    if let Some(module) = record.module_path() {
        entry = entry.with_field("module", module);
    }
    if let Some(file) = record.file() {
        entry = entry.with_field("file", file);
    }
    if let Some(line) = record.line() {
        entry = entry.with_field("line", line);
    }
    entry
}

impl HookLogger {
    pub fn new(hook: Arc<Hook>) -> Self {
        Self { hook }
    }

    pub fn hook(&self) -> &Arc<Hook> {
        &self.hook
    }

    /// Install a logger for `hook` as the global `log` logger.
    ///
    /// Fails when another global logger is already set.
    pub fn install(hook: Arc<Hook>, max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(Self::new(hook)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl log::Log for HookLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        !is_own_target(metadata.target()) && self.hook.accepts(Level::from(metadata.level()))
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Err(err) = self.hook.fire(to_entry(record)) {
            eprintln!("stashhook: failed to deliver log record: {err}");
        }
    }

    fn flush(&self) {
        self.hook.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use log::Log;
    use rstest::rstest;

    use super::*;
    use crate::{formatter::FormatError, sink::Sink};

    #[derive(Default)]
    struct Lines(parking_lot::Mutex<Vec<String>>);

    impl Sink for Lines {
        fn write(&self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().push(String::from_utf8_lossy(data).into_owned());
            Ok(data.len())
        }
    }

    fn describe(entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let logger = entry.logger.as_deref().unwrap_or("-");
        Ok(format!("{} {logger} {}", entry.level, entry.message).into_bytes())
    }

    fn logger() -> (HookLogger, Arc<Lines>) {
        let lines = Arc::new(Lines::default());
        let hook = Arc::new(Hook::new(Arc::clone(&lines), describe));
        (HookLogger::new(hook), lines)
    }

    #[rstest]
    fn forwards_records_to_the_hook() {
        let (adapter, lines) = logger();
        adapter.log(
            &Record::builder()
                .args(format_args!("disk almost full"))
                .level(log::Level::Warn)
                .target("app::storage")
                .build(),
        );
        assert_eq!(
            lines.0.lock().as_slice(),
            ["WARN app::storage disk almost full"]
        );
    }

    #[rstest]
    fn skips_own_diagnostics() {
        let (adapter, lines) = logger();
        adapter.log(
            &Record::builder()
                .args(format_args!("stashhook: dropped 3 entries"))
                .level(log::Level::Warn)
                .target("stashhook::hook")
                .build(),
        );
        assert!(lines.0.lock().is_empty());
    }

    #[rstest]
    fn honours_hook_levels() {
        let (adapter, lines) = logger();
        adapter.hook().set_levels([Level::Error, Level::Critical]);
        let info = Metadata::builder()
            .level(log::Level::Info)
            .target("app")
            .build();
        assert!(!adapter.enabled(&info));
        adapter.log(
            &Record::builder()
                .args(format_args!("ignored"))
                .metadata(info)
                .build(),
        );
        assert!(lines.0.lock().is_empty());
    }

    #[rstest]
    fn records_source_location_as_fields() {
        let entry = to_entry(
            &Record::builder()
                .args(format_args!("located"))
                .level(log::Level::Error)
                .target("app")
                .module_path(Some("app::module"))
                .file(Some("src/module.rs"))
                .line(Some(42))
                .build(),
        );
        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.logger.as_deref(), Some("app"));
        assert_eq!(entry.fields["module"], "app::module");
        assert_eq!(entry.fields["file"], "src/module.rs");
        assert_eq!(entry.fields["line"], "42");
    }
}
