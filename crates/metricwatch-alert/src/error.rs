/// Errors that abort a rule execution.
///
/// An unparseable filter query is not among them: it is reported to the user
/// as a notification and the run completes normally.
///
/// # Examples
///
/// ```rust
/// use metricwatch_alert::error::AlertError;
///
/// let err = AlertError::InvalidParams("criterion 0: threshold needs 1 value".to_string());
/// assert!(err.to_string().contains("criterion 0"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The rule has no criteria; raised before any backend call.
    #[error("Alert: cannot execute a rule with 0 conditions")]
    NoCriteria,

    /// Rule parameters could not be decoded or failed validation.
    #[error("Alert: invalid rule parameters: {0}")]
    InvalidParams(String),

    /// The data backend failed to evaluate a criterion.
    #[error("Alert: backend failed to evaluate criterion {criterion}: {source}")]
    Backend {
        criterion: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A group key has more values than there are group-by fields.
    #[error("Alert: group '{group}' does not match group-by fields [{fields}]")]
    MalformedGrouping { group: String, fields: String },

    /// JSON serialization or deserialization failure.
    #[error("Alert: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` alias for alert evaluation.
pub type Result<T> = std::result::Result<T, AlertError>;
