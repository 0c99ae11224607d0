use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::{json, Value};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use uuid::Uuid;

use crate::config::TelemetrySettings;

/// Builder configuring telemetry for the deep memory engine.
pub struct DeepMemoryTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    sinks: Vec<Arc<dyn LogSink>>,
    min_level: LogLevel,
}

impl DeepMemoryTelemetryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            sinks: Vec::new(),
            min_level: LogLevel::Info,
        }
    }

    /// Sets the JSON log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Adds an extra sink (e.g. an in-memory buffer).
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Drops records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Applies file settings from the engine configuration.
    #[must_use]
    pub fn settings(mut self, settings: &TelemetrySettings) -> Self {
        if let Some(path) = &settings.log_path {
            self.log_path = Some(path.clone());
        }
        self.min_level = settings.min_level;
        self
    }

    /// Finalizes the builder, opening the log file if one was set.
    pub fn build(self) -> Result<DeepMemoryTelemetry> {
        let mut sinks = self.sinks;
        if let Some(path) = self.log_path {
            sinks.push(Arc::new(JsonLogger::new(path)?));
        }
        Ok(DeepMemoryTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                session: Uuid::new_v4(),
                min_level: self.min_level,
                sinks,
            }),
        })
    }
}

/// Telemetry handle for compression and lineage workflows.
#[derive(Clone)]
pub struct DeepMemoryTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for DeepMemoryTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepMemoryTelemetry")
            .field("module", &self.inner.module)
            .field("session", &self.inner.session)
            .field("sinks", &self.inner.sinks.len())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    session: Uuid,
    min_level: LogLevel,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl DeepMemoryTelemetry {
    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> DeepMemoryTelemetryBuilder {
        DeepMemoryTelemetryBuilder::new(module)
    }

    /// Session id stamped on every record from this handle.
    #[must_use]
    pub fn session(&self) -> Uuid {
        self.inner.session
    }

    /// Logs a structured record to every sink.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if !level.passes(self.inner.min_level) {
            return Ok(());
        }
        let record = LogRecord::new(&self.inner.module, level, message)
            .with_metadata(metadata)
            .with_field("session", json!(self.inner.session));
        for sink in &self.inner.sinks {
            sink.write(&record)?;
        }
        Ok(())
    }

    /// Emits a named event; events are info-level records tagged `kind = event`.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let payload = match payload {
            Value::Object(mut fields) => {
                fields.insert("kind".into(), json!("event"));
                Value::Object(fields)
            }
            other => json!({ "kind": "event", "payload": other }),
        };
        self.log(LogLevel::Info, event_type, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_logging::MemoryLogSink;
    use tempfile::tempdir;

    #[test]
    fn telemetry_logs_and_emits() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("deep_memory.log");
        let sink = Arc::new(MemoryLogSink::new(8));
        let telemetry = DeepMemoryTelemetry::builder("deep_memory")
            .log_path(&log_path)
            .sink(sink.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "deep_memory.test", json!({ "bytes": 12 }))
            .unwrap();
        telemetry
            .event("deep_memory.compress", json!({ "strategy": "lzma" }))
            .unwrap();
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("deep_memory.test"));
        assert_eq!(sink.len(), 2);
        let event = &sink.find("deep_memory.compress")[0];
        assert_eq!(event.metadata["kind"], json!("event"));
        assert_eq!(event.metadata["session"], json!(telemetry.session()));
    }

    #[test]
    fn records_below_threshold_are_dropped() {
        let sink = Arc::new(MemoryLogSink::new(8));
        let telemetry = DeepMemoryTelemetry::builder("deep_memory")
            .sink(sink.clone())
            .min_level(LogLevel::Warn)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "noise", Value::Null)
            .unwrap();
        telemetry
            .log(LogLevel::Error, "signal", Value::Null)
            .unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.snapshot()[0].message, "signal");
    }
}
