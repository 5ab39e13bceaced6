use core::fmt::{self, Write};

use strand_utils::Label;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

use crate::{logger::log_queue, supervisor::current_label};

/// Producer side of the logger: captures each event into a [`LogEntry`]
/// and enqueues it. Level filtering has already happened upstream, so
/// this layer never blocks and never filters.
///
/// [`LogEntry`]: crate::logger::LogEntry
pub struct QueueLayer {
    force_location: bool,
}

impl QueueLayer {
    pub fn new(force_location: bool) -> Self {
        Self { force_location }
    }
}

impl<S: Subscriber> Layer<S> for QueueLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = TextVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let origin = if self.force_location || cfg!(debug_assertions) {
            meta.file().zip(meta.line())
        } else {
            None
        };
        log_queue().publish(*meta.level(), caller_label(), visitor.text, origin);
    }
}

// Threads outside the supervisor fall back to their OS thread name.
fn caller_label() -> Label {
    if let Some(label) = current_label() {
        return label;
    }
    let current = std::thread::current();
    current
        .name()
        .and_then(|n| Label::new(n).ok())
        .unwrap_or_else(|| Label::new("?").expect("static label"))
}

/// Flattens the event's fields into one line: the `message` field first,
/// remaining fields appended as `key=value`.
#[derive(Default)]
struct TextVisitor {
    text: String,
}

impl Visit for TextVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.text.insert_str(0, value);
        } else {
            let _ = write!(self.text, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let rendered = format!("{value:?}");
            self.text.insert_str(0, &rendered);
        } else {
            let _ = write!(self.text, " {}={:?}", field.name(), value);
        }
    }
}
