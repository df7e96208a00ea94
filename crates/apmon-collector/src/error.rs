use crate::command::CommandError;

/// Errors raised while building or running a sampler.
///
/// # Examples
///
/// ```rust
/// use apmon_collector::SamplerError;
///
/// let err = SamplerError::UnsupportedPlatform("windows".to_string());
/// assert!(err.to_string().contains("windows"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// No command template exists for the detected platform.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A command template is unusable (empty command, bad divisor).
    #[error("invalid command template: {0}")]
    InvalidTemplate(String),

    /// Running the platform identification command failed.
    #[error("platform probe failed: {0}")]
    PlatformProbe(#[source] CommandError),

    /// The sampling command failed for a reason other than memory exhaustion
    /// or a timeout.
    #[error("command `{command}` failed: {source}")]
    Command {
        command: String,
        #[source]
        source: CommandError,
    },
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, SamplerError>;
