//! Output collection and exit-status classification.

use serde::{Deserialize, Serialize};

/// What a caller gets back from one execution. Both fields are always
/// present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ExecutionResult {
    pub output: String,
    pub error: String,
}

impl ExecutionResult {
    /// Returns true when nothing was reported on the error channel.
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// Exit status used when the runtime reports none.
pub(crate) const UNKNOWN_STATUS: i64 = -1;

/// Builds the response from a finished run.
///
/// Stderr always wins when present. A non-zero exit with silent stderr
/// gets a synthesized message, and any stdout is moved in front of it.
pub(crate) fn classify(status: i64, stdout: &[u8], stderr: &[u8]) -> ExecutionResult {
    let mut output = decode(stdout);
    let mut error = decode(stderr);

    if status != 0 && error.is_empty() {
        error = format!("Script exited with error code {status}.");
        if !output.is_empty() {
            error = format!("{output}\n{error}");
            output.clear();
        }
    }

    ExecutionResult { output, error }
}

/// Decodes captured bytes as UTF-8, replacing invalid sequences.
pub(crate) fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_passes_streams_through() {
        let result = classify(0, b"hello\n", b"");
        assert_eq!(result.output, "hello\n");
        assert!(result.error.is_empty());
        assert!(result.is_success());
    }

    #[test]
    fn test_success_keeps_stderr_warnings() {
        let result = classify(0, b"ok", b"DeprecationWarning");
        assert_eq!(result.output, "ok");
        assert_eq!(result.error, "DeprecationWarning");
    }

    #[test]
    fn test_nonzero_exit_with_stdout_is_merged() {
        let result = classify(1, b"partial", b"");
        assert_eq!(result.output, "");
        assert_eq!(result.error, "partial\nScript exited with error code 1.");
    }

    #[test]
    fn test_nonzero_exit_without_any_output() {
        let result = classify(3, b"", b"");
        assert_eq!(result.output, "");
        assert_eq!(result.error, "Script exited with error code 3.");
    }

    #[test]
    fn test_stderr_wins_over_synthesis() {
        let result = classify(1, b"", b"boom");
        assert_eq!(result.output, "");
        assert_eq!(result.error, "boom");

        let result = classify(1, b"partial", b"Traceback");
        assert_eq!(result.output, "partial");
        assert_eq!(result.error, "Traceback");
    }

    #[test]
    fn test_unknown_status_is_synthesized() {
        let result = classify(UNKNOWN_STATUS, b"", b"");
        assert_eq!(result.error, "Script exited with error code -1.");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let result = classify(0, b"caf\xc3", b"");
        assert_eq!(result.output, "caf\u{fffd}");
    }

    #[test]
    fn test_serializes_both_fields() {
        let json = serde_json::to_value(ExecutionResult::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "output": "", "error": "" }));
    }
}
