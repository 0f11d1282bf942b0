//! Error types for the kcm e2e suite
//!
//! Errors carry the context needed to triage a failed run from CI logs alone:
//! which command failed, which config field was bad, which provider name was
//! not recognised.

use thiserror::Error;

/// Main error type for suite operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid suite configuration
    #[error("configuration error{}: {message}", field_suffix(.field))]
    Config {
        /// Description of what's invalid
        message: String,
        /// The offending setting (e.g., "--replica-override")
        field: Option<String>,
    },

    /// A provider name that has no known label or expectation
    #[error("unknown provider: {name}")]
    UnknownProvider {
        /// The name as given by the caller
        name: String,
    },

    /// An external command (make, support-bundle) failed
    #[error("command `{command}` failed{}: {message}", exit_suffix(.exit_code))]
    Command {
        /// The command line that was run
        command: String,
        /// Captured stderr or spawn failure
        message: String,
        /// Process exit code, when the process ran at all
        exit_code: Option<i32>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "create_client", "list_templates")
        context: String,
    },
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_deref()
        .map(|f| format!(" [{f}]"))
        .unwrap_or_default()
}

fn exit_suffix(exit_code: &Option<i32>) -> String {
    exit_code
        .map(|c| format!(" (exit {c})"))
        .unwrap_or_default()
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a specific setting
    pub fn config_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an unknown provider error
    pub fn unknown_provider(name: impl Into<String>) -> Self {
        Self::UnknownProvider { name: name.into() }
    }

    /// Create a command failure
    pub fn command(
        command: impl Into<String>,
        msg: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::Command {
            command: command.into(),
            message: msg.into(),
            exit_code,
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a typo in the provider list is reported by name so the operator
    /// can fix the CI variable without reading code.
    #[test]
    fn story_unknown_provider_names_the_input() {
        let err = Error::unknown_provider("infrastructure-awss");
        assert_eq!(err.to_string(), "unknown provider: infrastructure-awss");
    }

    /// Story: config errors point at the setting that was wrong
    #[test]
    fn story_config_errors_carry_field() {
        let err = Error::config_for_field("--replica-override", "count must be at least 1");
        assert_eq!(
            err.to_string(),
            "configuration error [--replica-override]: count must be at least 1"
        );

        let err = Error::config("timeout must be greater than zero");
        assert_eq!(
            err.to_string(),
            "configuration error: timeout must be greater than zero"
        );
    }

    /// Story: a failed `make test-apply` shows the exit code and stderr
    #[test]
    fn story_command_failure_includes_exit_code() {
        let err = Error::command("make test-apply", "no rule to make target", Some(2));
        let msg = err.to_string();
        assert!(msg.contains("make test-apply"));
        assert!(msg.contains("(exit 2)"));
        assert!(msg.contains("no rule to make target"));

        let err = Error::command("support-bundle", "not found in PATH", None);
        assert!(!err.to_string().contains("exit"));
    }

    #[test]
    fn test_internal_error_context() {
        let err = Error::internal_with_context("create_client", "failed to infer config");
        assert_eq!(
            err.to_string(),
            "internal error [create_client]: failed to infer config"
        );
    }
}
