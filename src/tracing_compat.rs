//! Bridge from `tracing` events to a [`Hook`].
//!
//! [`HookLayer`] is a `tracing_subscriber` layer turning each event into a
//! [`LogEntry`]: the `message` field becomes the entry message and every
//! other field is recorded as a string.

use std::{fmt, sync::Arc};

use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    subscriber::Interest,
};
use tracing_subscriber::{Layer, layer::Context};

use crate::{entry::LogEntry, hook::Hook, is_own_target, level::Level};

/// Layer forwarding `tracing` events to a hook.
#[derive(Clone, Debug)]
pub struct HookLayer {
    hook: Arc<Hook>,
}

impl HookLayer {
    pub fn new(hook: Arc<Hook>) -> Self {
        Self { hook }
    }
}

fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE => Level::Trace,
        tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Info,
        tracing::Level::WARN => Level::Warn,
        tracing::Level::ERROR => Level::Error,
    }
}

struct EntryVisitor<'a> {
    entry: &'a mut LogEntry,
}

impl Visit for EntryVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.entry.message = value.to_owned();
        } else {
            self.entry.fields.insert(field.name().to_owned(), value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.entry.message = format!("{value:?}");
        } else {
            self.entry
                .fields
                .insert(field.name().to_owned(), format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for HookLayer {
    // Hook levels can change at runtime, so interest is never cached.
    fn register_callsite(&self, _metadata: &'static tracing::Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &tracing::Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        !is_own_target(metadata.target()) && self.hook.accepts(map_level(metadata.level()))
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut entry =
            LogEntry::new(map_level(metadata.level()), String::new()).with_logger(metadata.target());
        event.record(&mut EntryVisitor { entry: &mut entry });
        if let Err(err) = self.hook.fire(entry) {
            eprintln!("stashhook: failed to deliver tracing event: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use parking_lot::Mutex;
    use rstest::rstest;
    use tracing_subscriber::prelude::*;

    use super::*;
    use crate::{formatter::FormatError, sink::Sink};

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl Sink for Lines {
        fn write(&self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().push(String::from_utf8_lossy(data).into_owned());
            Ok(data.len())
        }
    }

    fn describe(entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let fields: Vec<String> = entry
            .fields
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        Ok(format!("{} {} [{}]", entry.level, entry.message, fields.join(",")).into_bytes())
    }

    #[rstest]
    fn forwards_events_with_fields() {
        let lines = Arc::new(Lines::default());
        let hook = Arc::new(Hook::new(Arc::clone(&lines), describe));
        let subscriber = tracing_subscriber::registry().with(HookLayer::new(hook));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "app", user = "ada", attempts = 3, "login failed");
        });
        assert_eq!(
            lines.0.lock().as_slice(),
            ["WARN login failed [attempts=3,user=ada]"]
        );
    }

    #[rstest]
    fn respects_hook_levels() {
        let lines = Arc::new(Lines::default());
        let hook = Arc::new(Hook::new(Arc::clone(&lines), describe));
        hook.set_levels([Level::Error]);
        let subscriber = tracing_subscriber::registry().with(HookLayer::new(hook));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", "quiet");
            tracing::error!(target: "app", "loud");
        });
        assert_eq!(lines.0.lock().as_slice(), ["ERROR loud []"]);
    }

    #[rstest]
    fn skips_own_diagnostics() {
        let lines = Arc::new(Lines::default());
        let hook = Arc::new(Hook::new(Arc::clone(&lines), describe));
        let subscriber = tracing_subscriber::registry().with(HookLayer::new(hook));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "stashhook::hook", "dropped 3 entries");
            tracing::warn!("emitted from this module");
            tracing::warn!(target: "app", "kept");
        });
        assert_eq!(lines.0.lock().as_slice(), ["WARN kept []"]);
    }
}
