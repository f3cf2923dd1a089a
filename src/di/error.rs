use thiserror::Error;

/// Failure to build the object graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("missing type: {type_name} is not provided")]
    Missing { type_name: String },

    #[error("cannot provide {type_name} from {constructor}: already provided by {existing}")]
    AlreadyProvided {
        type_name: String,
        constructor: String,
        existing: String,
    },

    #[error("cycle detected in dependency graph: {path}")]
    Cycle { path: String },

    #[error("could not build {type_name}: {source}")]
    Constructor {
        type_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("invoke {function} failed: {source}")]
    Invoke {
        function: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to build event logger {constructor}: {source}")]
    Logger {
        constructor: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<GraphError>),
}

impl GraphError {
    pub fn missing<T: ?Sized>() -> Self {
        Self::Missing {
            type_name: std::any::type_name::<T>().to_string(),
        }
    }

    /// Combine errors collected while registering providers
    pub(crate) fn combine(mut errors: Vec<GraphError>) -> Option<GraphError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}
