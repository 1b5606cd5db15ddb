use thiserror::Error;

/// Failures produced by the core rehearsal services.
///
/// Only a subset of these ever crosses a public contract: `PersonaFailure`
/// and `AudioFailure` are absorbed into degraded response fields by the
/// components that encounter them, and `StreamFailure` is surfaced as an
/// `error` event on the feedback stream rather than a returned `Err`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller-supplied data failed a precondition.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single-shot analysis call errored or returned output that could
    /// not be parsed into the expected structure.
    #[error("analysis failed: {0}")]
    AnalysisFailure(#[source] anyhow::Error),

    /// One persona's generation call failed. Recovered locally into a
    /// degraded response; never fatal for the batch on its own.
    #[error("persona '{persona}' failed: {source}")]
    PersonaFailure {
        persona: String,
        #[source]
        source: anyhow::Error,
    },

    /// Every persona in the catalog failed for the same request.
    #[error("all {0} personas failed to respond")]
    AllPersonasFailed(usize),

    /// Speech synthesis failed for one response. Degrades only that
    /// response's audio field.
    #[error("audio synthesis failed: {0}")]
    AudioFailure(#[source] anyhow::Error),

    /// The coaching stream's backing capability failed.
    #[error("feedback stream failed: {0}")]
    StreamFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidInput("prompt is empty".to_string());
        assert_eq!(format!("{}", err), "invalid input: prompt is empty");

        let err = CoreError::AllPersonasFailed(5);
        assert_eq!(format!("{}", err), "all 5 personas failed to respond");

        let err = CoreError::PersonaFailure {
            persona: "chipper".to_string(),
            source: anyhow!("timed out"),
        };
        assert!(format!("{}", err).contains("chipper"));
    }
}
