use crate::config::ConfigError;
use crate::di::GraphError;
use crate::lifecycle::AppState;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The lifecycle phase an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Phase {
    Start,
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => f.write_str("OnStart"),
            Phase::Stop => f.write_str("OnStop"),
        }
    }
}

/// Coarse classification of [`Error`], used for exit codes and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Graph,
    Start,
    Stop,
    Timeout,
    InvalidState,
    Config,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The object graph could not be built; no hook has run
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A single hook callback returned an error or panicked
    #[error("{phase} hook #{index} ({name}) failed: {source}")]
    Hook {
        phase: Phase,
        index: usize,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A phase ran past its deadline
    #[error("{phase} hooks timed out after {timeout:?}")]
    Timeout { phase: Phase, timeout: Duration },

    /// The caller cancelled the context driving a phase
    #[error("{phase} hooks cancelled by caller")]
    Cancelled { phase: Phase },

    /// Several teardown failures collected during one stop phase
    #[error("{}", join(.0))]
    Aggregate(Vec<Error>),

    /// A start failure followed by a teardown that also failed
    #[error("{cause}; rollback also failed: {rollback}")]
    Rollback {
        #[source]
        cause: Box<Error>,
        rollback: Box<Error>,
    },

    #[error("cannot {action} application in state {state}")]
    InvalidState {
        action: &'static str,
        state: AppState,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn hook(
        phase: Phase,
        index: usize,
        name: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Hook {
            phase,
            index,
            name: name.into(),
            source: source.into(),
        }
    }

    /// Combine collected errors: none is `Ok`, one is returned as is
    pub fn aggregate(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Graph(_) => ErrorKind::Graph,
            Error::Hook {
                phase: Phase::Start,
                ..
            } => ErrorKind::Start,
            Error::Hook {
                phase: Phase::Stop, ..
            }
            | Error::Aggregate(_) => ErrorKind::Stop,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled { phase } => match phase {
                Phase::Start => ErrorKind::Start,
                Phase::Stop => ErrorKind::Stop,
            },
            Error::Rollback { cause, .. } => cause.kind(),
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Phase the error belongs to; timeouts count as errors of their phase
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Hook { phase, .. }
            | Error::Timeout { phase, .. }
            | Error::Cancelled { phase } => Some(*phase),
            Error::Aggregate(_) => Some(Phase::Stop),
            Error::Rollback { cause, .. } => cause.phase(),
            _ => None,
        }
    }

    /// The error that decided the outcome of the run
    pub fn primary(&self) -> &Error {
        match self {
            Error::Rollback { cause, .. } => cause.primary(),
            other => other,
        }
    }

    /// Errors that happened while tearing down after the primary cause
    pub fn rollback(&self) -> Option<&Error> {
        match self {
            Error::Rollback { rollback, .. } => Some(rollback),
            _ => None,
        }
    }

    /// Whether an error of type `E` appears anywhere in this error's causes
    pub fn matches<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        match self {
            Error::Hook { source, .. } => source.chain().any(|cause| cause.is::<E>()),
            Error::Aggregate(errors) => errors.iter().any(Error::matches::<E>),
            Error::Rollback { cause, rollback } => cause.matches::<E>() || rollback.matches::<E>(),
            other => {
                let mut cause: Option<&(dyn StdError + 'static)> = match other {
                    Error::Graph(graph) => Some(graph),
                    Error::Config(config) => Some(config),
                    _ => Some(other),
                };
                while let Some(err) = cause {
                    if err.is::<E>() {
                        return true;
                    }
                    cause = err.source();
                }
                false
            }
        }
    }

    /// Process exit status for a run that ended with this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Graph | ErrorKind::Config => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[derive(Debug, Error)]
    #[error("network down")]
    struct NetError;

    #[test]
    fn test_aggregate_collapses_single_error() {
        assert!(Error::aggregate(Vec::new()).is_ok());

        let single = Error::aggregate(vec![Error::hook(Phase::Stop, 0, "db", DiskError)]);
        assert!(matches!(single, Err(Error::Hook { index: 0, .. })));

        let many = Error::aggregate(vec![
            Error::hook(Phase::Stop, 1, "cache", NetError),
            Error::hook(Phase::Stop, 0, "db", DiskError),
        ])
        .unwrap_err();
        assert_eq!(many.kind(), ErrorKind::Stop);
        assert!(many.to_string().contains("cache"));
        assert!(many.to_string().contains("db"));
    }

    #[test]
    fn test_matches_walks_wrapped_causes() {
        let err = Error::hook(
            Phase::Start,
            2,
            "listener",
            anyhow::Error::new(DiskError).context("binding port"),
        );
        assert!(err.matches::<DiskError>());
        assert!(!err.matches::<NetError>());

        let rolled_back = Error::Rollback {
            cause: Box::new(err),
            rollback: Box::new(Error::hook(Phase::Stop, 0, "db", NetError)),
        };
        assert!(rolled_back.matches::<DiskError>());
        assert!(rolled_back.matches::<NetError>());
        assert_eq!(rolled_back.kind(), ErrorKind::Start);
        assert!(matches!(rolled_back.primary(), Error::Hook { index: 2, .. }));
    }

    #[test]
    fn test_exit_codes() {
        let graph = Error::from(GraphError::Missing {
            type_name: "Db".into(),
        });
        assert_eq!(graph.exit_code(), 2);
        assert!(graph.matches::<GraphError>());

        let timeout = Error::Timeout {
            phase: Phase::Stop,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.exit_code(), 1);
        assert_eq!(timeout.phase(), Some(Phase::Stop));
    }
}
