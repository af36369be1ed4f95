//! Captures tracing events so tests can assert on workflow log output.
//!
//! The subscriber is installed as the thread default, so it only sees events
//! emitted on the test's own thread. Tests using it run on the current-thread
//! runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{dispatcher, Dispatch, Event as TracingEvent, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context as LayerContext, Layer};
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Field value with surrounding quotes stripped.
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|v| v.trim_matches('"').to_string())
    }

    pub fn workflow_id(&self) -> Option<u64> {
        self.field("workflow_id")?.parse().ok()
    }

    pub fn attempt(&self) -> Option<u32> {
        self.field("attempt")?.parse().ok()
    }
}

pub type Captured = Arc<Mutex<Vec<CapturedEvent>>>;

/// Events whose message contains `needle`.
pub fn with_message(captured: &Captured, needle: &str) -> Vec<CapturedEvent> {
    captured
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.message.contains(needle))
        .cloned()
        .collect()
}

struct CaptureLayer {
    events: Captured,
}

struct FieldCapture<'a> {
    fields: &'a mut BTreeMap<String, String>,
}

impl Visit for FieldCapture<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &TracingEvent<'_>, _ctx: LayerContext<'_, S>) {
        let mut fields = BTreeMap::new();
        event.record(&mut FieldCapture { fields: &mut fields });
        let message = fields.get("message").cloned().unwrap_or_default();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

/// Install a capturing subscriber for the current thread.
///
/// Events are captured until the returned guard is dropped.
pub fn install_tracing_capture() -> (Captured, dispatcher::DefaultGuard) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let collector = tracing_subscriber::registry()
        .with(CaptureLayer {
            events: captured.clone(),
        })
        .with(LevelFilter::TRACE);
    let guard = dispatcher::set_default(&Dispatch::new(collector));
    (captured, guard)
}
