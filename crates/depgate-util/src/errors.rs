use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all DepGate operations.
#[derive(Debug, Error, Diagnostic)]
pub enum DepGateError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed manifest, lockfile, or project file.
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check the manifest or lockfile for syntax errors"))]
    Manifest { message: String },

    /// Network request to a registry or provider failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Version resolution failed (bad spec, no matching version).
    #[error("Resolution error: {message}")]
    Resolution { message: String },

    /// Invalid configuration or policy file.
    #[error("Config error: {message}")]
    #[diagnostic(help("Check the config file passed via --config"))]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type DepGateResult<T> = miette::Result<T>;

/// Process exit codes used by the CLI.
///
/// Exit code 3 doubles as the warning exit; there is no separate value for
/// "completed with warnings".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    FileError,
    ConnectionError,
    PackageNotFound,
    Interrupted,
}

impl ExitCode {
    /// Numeric process exit code.
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::FileError => 1,
            ExitCode::ConnectionError => 2,
            ExitCode::PackageNotFound => 3,
            ExitCode::Interrupted => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::FileError.code(), 1);
        assert_eq!(ExitCode::ConnectionError.code(), 2);
        assert_eq!(ExitCode::PackageNotFound.code(), 3);
        assert_eq!(ExitCode::Interrupted.code(), 130);
    }

    #[test]
    fn network_error_message() {
        let err = DepGateError::Network {
            message: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "Network error: timeout");
    }
}
