use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Bail out of a pipeline operation once its token is cancelled. Checked
/// before every blocking external call so a cancelled run stops between
/// steps instead of completing silently.
pub fn ensure_live(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_token_stops_the_operation() {
        let token = CancellationToken::new();
        assert!(ensure_live(&token).is_ok());
        token.cancel();
        assert!(matches!(ensure_live(&token), Err(PipelineError::Cancelled)));
    }
}
