use thiserror::Error;

/// Errors raised by pipeline stages.
///
/// Everything here aborts the current invocation; no stage retries and no
/// partial artifact is written once a stage has failed. Non-fatal fit
/// conditions (a model that ran out of its iteration budget) are reported as
/// data on the result, not raised.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input in column '{column}': {reason}")]
    Input { column: String, reason: String },

    #[error("insufficient data for {context}: {rows} rows available, {required} required")]
    InsufficientData {
        context: String,
        rows: usize,
        required: usize,
    },

    #[error("data leakage guard tripped: {detail}")]
    DataLeakageGuard { detail: String },

    #[error("model fit failed: {reason}")]
    Fit { reason: String },

    #[error("failed to read {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Shorthand for the most common failure: a column that cannot be used.
    pub fn input(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Input {
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn fit(reason: impl Into<String>) -> Self {
        Self::Fit {
            reason: reason.into(),
        }
    }
}
