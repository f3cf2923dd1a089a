use super::{EventLogger, LifecycleEvent};

/// Forwards lifecycle events to `tracing`
///
/// This is the default logger. Failures are reported at `error` level,
/// hook progress at `debug`, everything else at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn log_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Provided {
                constructor,
                output_types,
                error,
            } => match error {
                Some(error) => tracing::error!(%constructor, %error, "error encountered while providing"),
                None => tracing::info!(%constructor, types = ?output_types, "provided"),
            },
            LifecycleEvent::Invoked { function, error } => match error {
                Some(error) => tracing::error!(%function, %error, "invoke failed"),
                None => tracing::info!(%function, "invoked"),
            },
            LifecycleEvent::LoggerInitialized { constructor, error } => match error {
                Some(error) => tracing::error!(?constructor, %error, "event logger initialization failed"),
                None => tracing::info!(?constructor, "event logger initialized"),
            },
            LifecycleEvent::OnStartExecuting { index, hook } => {
                tracing::debug!(index, %hook, "OnStart hook executing");
            }
            LifecycleEvent::OnStartExecuted {
                index,
                hook,
                runtime,
            } => {
                tracing::debug!(index, %hook, ?runtime, "OnStart hook executed");
            }
            LifecycleEvent::StartFailed { index, hook, error } => {
                tracing::error!(index, %hook, %error, "OnStart hook failed");
            }
            LifecycleEvent::Started => tracing::info!("started"),
            LifecycleEvent::RollingBack { start_error } => {
                tracing::error!(%start_error, "start failed, rolling back");
            }
            LifecycleEvent::RolledBack { error } => match error {
                Some(error) => tracing::error!(%error, "rollback failed"),
                None => tracing::info!("rolled back"),
            },
            LifecycleEvent::Stopping { cause } => tracing::info!(%cause, "received signal, stopping"),
            LifecycleEvent::OnStopExecuting { index, hook } => {
                tracing::debug!(index, %hook, "OnStop hook executing");
            }
            LifecycleEvent::OnStopExecuted {
                index,
                hook,
                runtime,
            } => {
                tracing::debug!(index, %hook, ?runtime, "OnStop hook executed");
            }
            LifecycleEvent::StopFailed { index, hook, error } => {
                tracing::error!(index, %hook, %error, "OnStop hook failed");
            }
            LifecycleEvent::Stopped { error } => match error {
                Some(error) => tracing::error!(%error, "stop failed"),
                None => tracing::info!("stopped"),
            },
        }
    }
}
