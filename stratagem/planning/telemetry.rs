use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::{Builder, Handle};

use crate::config::TelemetrySettings;

/// Builder for planning telemetry sinks.
pub struct PlanningTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    sinks: Vec<Arc<dyn LogSink>>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PlanningTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            sinks: Vec::new(),
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Starts from configured settings.
    #[must_use]
    pub fn from_settings(settings: &TelemetrySettings) -> Self {
        let mut builder = Self::new(settings.module.clone()).min_level(settings.min_level);
        builder.log_path = settings.log_path.clone();
        builder
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Adds a shared log sink.
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

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle, opening the log file if one was set.
    pub fn build(self) -> Result<PlanningTelemetry> {
        let mut sinks = self.sinks;
        if let Some(path) = self.log_path {
            let logger = JsonLogger::with_level(&path, self.min_level)
                .with_context(|| format!("opening planning log {}", path.display()))?;
            sinks.push(Arc::new(logger));
        }
        Ok(PlanningTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                min_level: self.min_level,
                sinks,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared across planning components.
#[derive(Clone)]
pub struct PlanningTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PlanningTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanningTelemetry")
            .field("module", &self.inner.module)
            .field("min_level", &self.inner.min_level)
            .field("sinks", &self.inner.sinks.len())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    min_level: LogLevel,
    sinks: Vec<Arc<dyn LogSink>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl PlanningTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PlanningTelemetryBuilder {
        PlanningTelemetryBuilder::new(module)
    }

    /// Module name stamped on records.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logs structured metadata to every sink that accepts `level`.
    pub fn log(&self, level: LogLevel, message: &str, metadata: &Value) -> Result<()> {
        if level < self.inner.min_level {
            return Ok(());
        }
        let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
        for sink in &self.inner.sinks {
            if sink.accepts(level) {
                sink.write(&record)?;
            }
        }
        Ok(())
    }

    /// Publishes an event. Spawns on the ambient runtime when there is one,
    /// otherwise blocks on a short-lived current-thread runtime.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };
        let record = EventRecord::new(&self.inner.module, event_type, payload);
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    tracing::warn!(error = %err, "planning event publish failed");
                }
            });
            Ok(())
        } else {
            let runtime = Builder::new_current_thread()
                .build()
                .context("building telemetry runtime")?;
            runtime.block_on(publisher.publish(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::MemoryLogger;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("planning.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = PlanningTelemetry::builder("planning")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "planning.schedule", &json!({ "tasks": 3 }))
            .unwrap();
        telemetry
            .event("planning.schedule.ready", json!({ "feasible": true }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("planning.schedule"));
        assert_eq!(bus.snapshot().len(), 1);
        assert_eq!(bus.snapshot()[0].source, "planning");
    }

    #[test]
    fn min_level_filters_shared_sinks() {
        let sink = Arc::new(MemoryLogger::new());
        let telemetry = PlanningTelemetry::builder("planning")
            .sink(sink.clone())
            .min_level(LogLevel::Warn)
            .build()
            .unwrap();
        telemetry.log(LogLevel::Info, "quiet", &json!({})).unwrap();
        telemetry.log(LogLevel::Error, "loud", &json!({ "code": 7 })).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.find("loud")[0].metadata["code"], json!(7));
    }

    #[test]
    fn settings_seed_the_builder() {
        let settings = TelemetrySettings::default();
        let telemetry = PlanningTelemetryBuilder::from_settings(&settings).build().unwrap();
        assert_eq!(telemetry.module(), "planning-core");
        assert!(telemetry.event("noop", json!({})).is_ok());
    }
}
