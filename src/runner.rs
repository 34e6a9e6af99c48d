use std::process::{Command, Output, Stdio};

/// Result of one wake invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure { diagnostic: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { diagnostic } => Some(diagnostic),
        }
    }

    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Self::Failure {
            diagnostic: diagnostic.into(),
        }
    }
}

/// Runs `argv` without a shell and waits for it to exit.
///
/// Launch errors are reported as `Failure` so callers only deal with one shape.
pub fn run_wake(argv: &[String]) -> RunOutcome {
    let Some((program, args)) = argv.split_first() else {
        return RunOutcome::failure("wake command is empty");
    };
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output();
    match output {
        Ok(output) => outcome_from_output(&output),
        Err(err) => RunOutcome::failure(err.to_string()),
    }
}

fn outcome_from_output(output: &Output) -> RunOutcome {
    if output.status.success() {
        return RunOutcome::Success;
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    RunOutcome::failure(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_is_success() {
        assert_eq!(run_wake(&sh("echo ignored")), RunOutcome::Success);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_reports_stderr() {
        let outcome = run_wake(&sh("echo 'oops' >&2; echo noise; exit 3"));
        assert_eq!(outcome, RunOutcome::failure("oops"));
    }

    #[cfg(unix)]
    #[test]
    fn empty_stderr_falls_back_to_stdout() {
        let outcome = run_wake(&sh("echo '  oops  '; exit 2"));
        assert_eq!(outcome.diagnostic(), Some("oops"));
        assert!(!outcome.is_success());
    }

    #[cfg(unix)]
    #[test]
    fn silent_failure_has_empty_diagnostic() {
        assert_eq!(run_wake(&sh("exit 1")), RunOutcome::failure(""));
    }

    #[test]
    fn missing_binary_is_a_failure() {
        let outcome = run_wake(&["clay-bridge-no-such-binary".to_string()]);
        assert!(!outcome.is_success());
        assert!(!outcome.diagnostic().unwrap_or_default().is_empty());
    }

    #[test]
    fn empty_argv_is_a_failure() {
        assert_eq!(run_wake(&[]), RunOutcome::failure("wake command is empty"));
    }
}
