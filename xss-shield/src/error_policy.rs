use crate::config::ErrorMode;
use crate::error::{Result, XssError};
use tracing::error;

/// Resolves a sanitization failure according to the configured [`ErrorMode`].
///
/// Request parameters and structured-payload fields both go through this
/// single function, so a given mode behaves the same on every surface.
pub fn on_failure(mode: ErrorMode, err: XssError, original: &str) -> Result<String> {
    match mode {
        ErrorMode::Throw => Err(err),
        ErrorMode::LogAndContinue => {
            error!(value = original, error = %err, "XSS sanitization failed; returning original value");
            Ok(original.to_string())
        }
        ErrorMode::ReturnOriginal => Ok(original.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyId;

    fn failure() -> XssError {
        XssError::sanitization(PolicyId::Normal, "boom")
    }

    #[test]
    fn test_throw_propagates() {
        let err = on_failure(ErrorMode::Throw, failure(), "<b>x</b>").unwrap_err();
        assert!(matches!(err, XssError::SanitizationFailed { policy: PolicyId::Normal, .. }));
        assert_eq!(err.to_string(), "Sanitization failed under normal policy: boom");
    }

    #[test]
    fn test_continue_modes_return_original() {
        for mode in [ErrorMode::LogAndContinue, ErrorMode::ReturnOriginal] {
            assert_eq!(on_failure(mode, failure(), "<b>x</b>").unwrap(), "<b>x</b>");
        }
    }
}
