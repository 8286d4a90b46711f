//! Error types for the smart-average engine.
//!
//! Every failure surfaces as one of four kinds; row-level skips (empty
//! response distributions, empty intermediate frames) are logged, not errors.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad invocation or environment: missing connection string,
    /// unrecognized quarter, malformed academic year.
    #[error("configuration error: {0}")]
    Config(String),

    /// The store was unreachable, a query failed, or the data violated the
    /// input contract (e.g. non-finite response weights).
    #[error("ingestion failed while {context}")]
    Ingestion {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// An arithmetic invariant was violated during scoring.
    #[error("computation error in {time_group} for question {question_id}: {message}")]
    Computation {
        time_group: String,
        question_id: i32,
        message: String,
    },

    /// A merge or delete against the output table failed. Fatal; the run
    /// can be retried since persistence is idempotent.
    #[error("persistence failed while {context}")]
    Persistence {
        context: String,
        #[source]
        source: sqlx::Error,
    },
}

impl EngineError {
    pub fn ingestion(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        EngineError::Ingestion {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn persistence(context: impl Into<String>, source: sqlx::Error) -> Self {
        EngineError::Persistence {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
