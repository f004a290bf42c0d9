//! Structured events emitted while tasks run against repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Plan,
    Apply,
    Skip,
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub kind: EventKind,
    pub level: EventLevel,
    pub message: String,
}

impl Event {
    pub fn new(kind: EventKind, level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            repository: None,
            task: None,
            action: None,
            kind,
            level,
            message: message.into(),
        }
    }

    pub fn plan(message: impl Into<String>) -> Self {
        Self::new(EventKind::Plan, EventLevel::Info, message)
    }

    pub fn apply(message: impl Into<String>) -> Self {
        Self::new(EventKind::Apply, EventLevel::Info, message)
    }

    pub fn skip(level: EventLevel, message: impl Into<String>) -> Self {
        Self::new(EventKind::Skip, level, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventKind::Info, EventLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(EventKind::Info, EventLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, EventLevel::Error, message)
    }

    pub fn for_repository(mut self, repository: &Path) -> Self {
        self.repository = Some(repository.to_path_buf());
        self
    }

    pub fn for_task(mut self, task: &str) -> Self {
        self.task = Some(task.to_string());
        self
    }

    pub fn for_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    /// Fill repository/task/action only where the event left them unset.
    pub fn with_defaults(mut self, repository: &Path, task: &str, action: Option<&str>) -> Self {
        if self.repository.is_none() {
            self.repository = Some(repository.to_path_buf());
        }
        if self.task.is_none() {
            self.task = Some(task.to_string());
        }
        if self.action.is_none() {
            self.action = action.map(str::to_string);
        }
        self
    }
}

/// Receives events as they happen. Rendering is up to the sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Forwards events to `tracing` at a level matching the event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &Event) {
        let repository = event
            .repository
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let task = event.task.as_deref().unwrap_or_default();
        let action = event.action.as_deref().unwrap_or_default();
        match event.level {
            EventLevel::Info => tracing::info!(
                kind = ?event.kind,
                repository = %repository,
                task,
                action,
                "{}",
                event.message
            ),
            EventLevel::Warn => tracing::warn!(
                kind = ?event.kind,
                repository = %repository,
                task,
                action,
                "{}",
                event.message
            ),
            EventLevel::Error => tracing::error!(
                kind = ?event.kind,
                repository = %repository,
                task,
                action,
                "{}",
                event.message
            ),
        }
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesEventSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesEventSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }
}

impl EventSink for JsonLinesEventSink {
    fn emit(&self, event: &Event) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize event");
                return;
            }
        };
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(err) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
                tracing::warn!(error = %err, "failed to write event");
            }
        }
    }
}

/// Keeps every event in memory, mainly for tests and summaries.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Sends each event to every wrapped sink in order.
#[derive(Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: &Event) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
