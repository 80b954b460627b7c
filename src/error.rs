use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("alignment error: {message}")]
    Alignment { message: String },
    #[error("translator returned no hypothesis for sentence {sentence} (batch {batch})")]
    MissingHypothesis { batch: usize, sentence: usize },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("translator failed on batch {batch}: {source:#}")]
    Translator {
        batch: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl DriverError {
    pub(crate) fn alignment(message: impl Into<String>) -> Self {
        Self::Alignment {
            message: message.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn is_alignment(&self) -> bool {
        matches!(self, Self::Alignment { .. })
    }
}
