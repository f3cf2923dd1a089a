use super::{EventLogger, LifecycleEvent};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Output format of a [`ConsoleLogger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// One human readable line per event
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Writes lifecycle events to a writer, stderr by default
pub struct ConsoleLogger {
    writer: Mutex<Box<dyn Write + Send>>,
    format: Format,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::stderr(Format::Text)
    }
}

impl ConsoleLogger {
    pub fn new(writer: impl Write + Send + 'static, format: Format) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            format,
        }
    }

    pub fn stderr(format: Format) -> Self {
        Self::new(io::stderr(), format)
    }

    fn render(&self, event: &LifecycleEvent) -> String {
        match self.format {
            Format::Json => serde_json::to_string(event)
                .unwrap_or_else(|e| format!("{{\"event\":\"{}\",\"encode_error\":\"{}\"}}", event.name(), e)),
            Format::Text => text(event),
        }
    }
}

fn text(event: &LifecycleEvent) -> String {
    match event {
        LifecycleEvent::Provided {
            constructor,
            output_types,
            error,
        } => match error {
            Some(error) => format!("[conductor] ERROR\tfailed to provide {}: {}", constructor, error),
            None => output_types
                .iter()
                .map(|ty| format!("[conductor] PROVIDE\t{} <= {}", ty, constructor))
                .collect::<Vec<_>>()
                .join("\n"),
        },
        LifecycleEvent::Invoked { function, error } => match error {
            Some(error) => format!("[conductor] ERROR\tinvoke {} failed: {}", function, error),
            None => format!("[conductor] INVOKE\t{}", function),
        },
        LifecycleEvent::LoggerInitialized { constructor, error } => match (constructor, error) {
            (_, Some(error)) => format!("[conductor] ERROR\tfailed to build event logger: {}", error),
            (Some(constructor), None) => format!("[conductor] LOGGER\tinitialized {}", constructor),
            (None, None) => "[conductor] LOGGER\tinitialized default logger".to_string(),
        },
        LifecycleEvent::OnStartExecuting { index, hook } => {
            format!("[conductor] HOOK OnStart\t#{} {} executing", index, hook)
        }
        LifecycleEvent::OnStartExecuted {
            index,
            hook,
            runtime,
        } => format!("[conductor] HOOK OnStart\t#{} {} called, ran for {:?}", index, hook, runtime),
        LifecycleEvent::StartFailed { index, hook, error } => {
            format!("[conductor] HOOK OnStart\t#{} {} failed: {}", index, hook, error)
        }
        LifecycleEvent::Started => "[conductor] RUNNING".to_string(),
        LifecycleEvent::RollingBack { start_error } => {
            format!("[conductor] ERROR\tstart failed, rolling back: {}", start_error)
        }
        LifecycleEvent::RolledBack { error } => match error {
            Some(error) => format!("[conductor] ERROR\tcouldn't roll back cleanly: {}", error),
            None => "[conductor] ROLLED BACK".to_string(),
        },
        LifecycleEvent::Stopping { cause } => format!("[conductor] {}", cause.to_string().to_uppercase()),
        LifecycleEvent::OnStopExecuting { index, hook } => {
            format!("[conductor] HOOK OnStop\t#{} {} executing", index, hook)
        }
        LifecycleEvent::OnStopExecuted {
            index,
            hook,
            runtime,
        } => format!("[conductor] HOOK OnStop\t#{} {} called, ran for {:?}", index, hook, runtime),
        LifecycleEvent::StopFailed { index, hook, error } => {
            format!("[conductor] HOOK OnStop\t#{} {} failed: {}", index, hook, error)
        }
        LifecycleEvent::Stopped { error } => match error {
            Some(error) => format!("[conductor] ERROR\tfailed to stop cleanly: {}", error),
            None => "[conductor] STOPPED".to_string(),
        },
    }
}

impl EventLogger for ConsoleLogger {
    fn log_event(&self, event: &LifecycleEvent) {
        let line = self.render(event);
        if line.is_empty() {
            return;
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{}", line) {
            tracing::warn!("console event logger write failed: {}", e);
        }
    }
}
