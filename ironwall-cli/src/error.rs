//! CLI-specific error types and exit code mapping

use ironwall_core::error::IronwallError;
use ironwall_engine::EngineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The ruleset could not be loaded, built or validated.
    #[error("ruleset error: {0}")]
    Ruleset(#[from] EngineError),

    /// The packet argument is not usable.
    #[error("invalid packet: {0}")]
    Packet(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from ironwall-core.
    #[error("{0}")]
    Core(#[from] IronwallError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                              |
    /// |------|--------------------------------------|
    /// | 0    | Success                              |
    /// | 1    | General / command error              |
    /// | 2    | Configuration error                  |
    /// | 3    | Ruleset rejected                     |
    /// | 4    | Invalid packet input                 |
    /// | 10   | IO error                             |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(IronwallError::Config(_)) => 2,
            Self::Ruleset(_) => 3,
            Self::Core(IronwallError::Ruleset(_)) => 3,
            Self::Packet(_) => 4,
            Self::Io(_) => 10,
            Self::Core(IronwallError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}
