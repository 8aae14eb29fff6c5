//! Route `tracing` events into the unified logger
//!
//! Installed next to the console `fmt` layer so everything the process logs
//! through `tracing` also lands in the log store. Events from the logging
//! subsystem itself and from the storage driver are skipped, otherwise a
//! write could log about itself forever.
//!
//! Spans carrying a `correlation_id` field tag every event recorded inside
//! them, so a plain `info!` in a tool body lands under its invocation.

use crate::log_system::{LogEntry, LogLevel, LogType, UnifiedLogger};
use serde_json::{Map, Value};
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const CRATE_TARGET: &str = "mcp_scaffold";

const SKIPPED_TARGETS: &[&str] = &["mcp_scaffold::log_system", "sqlx"];

/// Forwards `tracing` events to a [`UnifiedLogger`].
#[derive(Clone, Default)]
pub struct UnifiedLayer {
    logger: Option<UnifiedLogger>,
}

impl UnifiedLayer {
    /// Forward to the process-wide logger once it is initialized.
    pub fn global() -> Self {
        Self { logger: None }
    }

    pub fn new(logger: UnifiedLogger) -> Self {
        Self {
            logger: Some(logger),
        }
    }

    fn sink(&self) -> Option<&UnifiedLogger> {
        self.logger.as_ref().or_else(|| UnifiedLogger::global())
    }
}

/// Correlation fields recorded on a span, kept in its extensions.
#[derive(Debug, Default, Clone)]
struct SpanCorrelation {
    correlation_id: Option<String>,
    tool_name: Option<String>,
}

impl SpanCorrelation {
    fn absorb(&mut self, visitor: EntryVisitor) {
        if visitor.correlation_id.is_some() {
            self.correlation_id = visitor.correlation_id;
        }
        if visitor.tool_name.is_some() {
            self.tool_name = visitor.tool_name;
        }
    }
}

impl<S> Layer<S> for UnifiedLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = EntryVisitor::default();
        attrs.record(&mut visitor);

        let mut fields = SpanCorrelation::default();
        fields.absorb(visitor);
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = EntryVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanCorrelation>() {
            Some(fields) => fields.absorb(visitor),
            None => {
                let mut fields = SpanCorrelation::default();
                fields.absorb(visitor);
                extensions.insert(fields);
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if SKIPPED_TARGETS.iter().any(|skip| target.starts_with(skip)) {
            return;
        }

        let Some(sink) = self.sink() else {
            return;
        };

        let level = LogLevel::from(metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let mut function = None;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if function.is_none() {
                    function = Some(span.name().to_string());
                }
                if visitor.correlation_id.is_some() && visitor.tool_name.is_some() {
                    break;
                }
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<SpanCorrelation>() {
                    if visitor.correlation_id.is_none() {
                        visitor.correlation_id = fields.correlation_id.clone();
                    }
                    if visitor.tool_name.is_none() {
                        visitor.tool_name = fields.tool_name.clone();
                    }
                }
            }
        }

        let log_type = if target.starts_with(CRATE_TARGET) {
            LogType::Internal
        } else {
            LogType::Framework
        };

        let module = metadata
            .file()
            .or(metadata.module_path())
            .unwrap_or(target);
        let mut entry =
            LogEntry::new(level, log_type, visitor.message).with_location(module, function, metadata.line());
        entry.logger = Some(target.to_string());
        entry.tool_name = visitor.tool_name;
        entry.extra = visitor.fields;
        if let Some(id) = visitor.correlation_id {
            entry.correlation_id = id;
        }

        // a closed logger just means we are shutting down
        let _ = sink.submit(entry);
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    correlation_id: Option<String>,
    tool_name: Option<String>,
    fields: Map<String, Value>,
}

impl EntryVisitor {
    fn record_value(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                }
            }
            "correlation_id" => self.correlation_id = value.as_str().map(str::to_string),
            "tool_name" => self.tool_name = value.as_str().map(str::to_string),
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, Value::from(format!("{:?}", value)));
    }
}
