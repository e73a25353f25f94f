use std::fmt;

/// Failure taxonomy for the pipeline core. Each collaborator seam maps its
/// failures into exactly one family so callers can tell where a run stopped.
#[derive(Debug)]
pub enum PipelineError {
    /// Content source unreachable or returned malformed feed/page data.
    Fetch(anyhow::Error),
    /// Knowledge store read failed.
    StoreRead(anyhow::Error),
    /// Knowledge store rejected a write.
    StoreWrite(anyhow::Error),
    /// Answer engine failed to produce a summary.
    Summarize(anyhow::Error),
    /// Answer engine failed to (re-)index the corpus.
    Index(anyhow::Error),
    /// Answer engine failed to produce an answer.
    Answer(anyhow::Error),
    /// Request rejected before any external call was made.
    Validation(String),
    /// The operation observed a cancelled token and aborted.
    Cancelled,
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PipelineError::Validation(msg.into())
    }

    /// Families that map to HTTP 400; everything else is a 500.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Fetch(err) => write!(f, "content fetch failed: {err}"),
            PipelineError::StoreRead(err) => write!(f, "store read failed: {err}"),
            PipelineError::StoreWrite(err) => write!(f, "store write failed: {err}"),
            PipelineError::Summarize(err) => write!(f, "summary generation failed: {err}"),
            PipelineError::Index(err) => write!(f, "corpus indexing failed: {err}"),
            PipelineError::Answer(err) => write!(f, "answer generation failed: {err}"),
            PipelineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            PipelineError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Fetch(err)
            | PipelineError::StoreRead(err)
            | PipelineError::StoreWrite(err)
            | PipelineError::Summarize(err)
            | PipelineError::Index(err)
            | PipelineError::Answer(err) => Some(err.as_ref()),
            PipelineError::Validation(_) | PipelineError::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_seam() {
        let err = PipelineError::Fetch(anyhow::anyhow!("connection refused"));
        assert_eq!(format!("{err}"), "content fetch failed: connection refused");
        assert!(!err.is_client_error());
    }

    #[test]
    fn validation_is_a_client_error() {
        let err = PipelineError::validation("question too long");
        assert!(err.is_client_error());
        assert_eq!(format!("{err}"), "invalid request: question too long");
    }
}
