//! Diagnostics emitted while delivering in the background.
//!
//! `logtest` installs a process-wide logger, so this file holds a single test.

mod test_utils;

use std::time::Duration;

use logtest::Logger;
use stashhook::{HookBuilder, Level, LogEntry, rate_limited_warner::RateLimitedWarner};
use test_utils::{FailingSink, fixtures::line};

#[test]
fn dropped_entries_are_reported_with_rate_limit() {
    let mut logger = Logger::start();

    let warner = RateLimitedWarner::new(Duration::from_secs(60));
    warner.record_drop();
    warner.warn_if_due(|count| log::warn!("{count} entries dropped"));
    warner.record_drop();
    warner.warn_if_due(|count| log::warn!("{count} entries dropped"));
    let first = logger.pop().expect("first drop is reported");
    assert_eq!(first.args(), "1 entries dropped");
    assert!(logger.pop().is_none(), "second drop waits for the interval");

    let sink = FailingSink::default();
    let hook = HookBuilder::new()
        .with_sink(sink.clone())
        .with_formatter(line)
        .with_warn_interval(Duration::from_secs(60))
        .build()
        .expect("valid configuration");
    hook.async_buffer(8).expect("start worker");
    for idx in 0..3 {
        hook.fire(LogEntry::new(Level::Error, format!("entry {idx}")))
            .expect("buffered fire");
    }
    hook.flush();
    assert_eq!(sink.attempts(), 3);

    let mut reported = 0;
    while let Some(record) = logger.pop() {
        if record.level() != log::Level::Warn || !record.target().starts_with("stashhook") {
            continue;
        }
        let message = record.args();
        if let Some(rest) = message.strip_prefix("stashhook: dropped ") {
            let count: u64 = rest
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .expect("drop count");
            reported += count;
        }
    }
    assert_eq!(reported, 3, "every dropped entry is reported exactly once");
}
