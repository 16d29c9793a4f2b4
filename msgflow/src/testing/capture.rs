//! Capturing tracing events in tests.

use crate::observability::WarningEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// One captured event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    /// The event's level.
    pub level: Level,
    /// The `event` field, if present.
    pub event: Option<String>,
    /// The log message.
    pub message: String,
    /// All other fields, formatted.
    pub fields: HashMap<String, String>,
}

/// Shared view of the events captured so far.
#[derive(Debug, Clone, Default)]
pub struct CapturedEvents {
    inner: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedEvents {
    /// Returns every captured event in order.
    #[must_use]
    pub fn all(&self) -> Vec<CapturedEvent> {
        self.inner.lock().clone()
    }

    /// Returns the captured events of one warning kind.
    #[must_use]
    pub fn of(&self, kind: WarningEvent) -> Vec<CapturedEvent> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.event.as_deref() == Some(kind.as_str()))
            .cloned()
            .collect()
    }

    /// Counts the captured events of one warning kind.
    #[must_use]
    pub fn count(&self, kind: WarningEvent) -> usize {
        self.of(kind).len()
    }

    /// Returns the captured events at `level`.
    #[must_use]
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }
}

/// Captures every event on the current thread until the guard drops.
///
/// Works with `#[tokio::test]`'s current-thread runtime, where spawned
/// tasks run on the test thread.
#[must_use]
pub fn capture_events() -> (CapturedEvents, DefaultGuard) {
    let events = CapturedEvents::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        events: events.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (events, guard)
}

struct CaptureLayer {
    events: CapturedEvents,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor.fields.remove("message").unwrap_or_default();
        let name = visitor.fields.remove("event");
        self.events.inner.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            event: name,
            message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}
