use crate::command::CommandRunner;
use crate::error::{Result, SamplerError};
use std::fmt;

/// Command used when the ambient OS identifier cannot be trusted.
pub const UNAME_COMMAND: &str = "uname -s";

/// Operating-system families that have a known process-status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    MacOs,
    Linux,
    FreeBsd,
    Solaris,
}

impl PlatformFamily {
    /// Matches an OS identifier such as `"x86_64-linux"`, `"Darwin"` or
    /// `"SunOS"` against the known families, ignoring case.
    ///
    /// # Examples
    ///
    /// ```
    /// use apmon_collector::platform::PlatformFamily;
    ///
    /// assert_eq!(
    ///     PlatformFamily::from_identifier("universal-darwin19"),
    ///     Some(PlatformFamily::MacOs)
    /// );
    /// assert_eq!(PlatformFamily::from_identifier("SunOS"), Some(PlatformFamily::Solaris));
    /// assert_eq!(PlatformFamily::from_identifier("windows"), None);
    /// ```
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        let id = identifier.to_lowercase();
        if id.contains("darwin") || id.contains("macos") {
            Some(PlatformFamily::MacOs)
        } else if id.contains("linux") {
            Some(PlatformFamily::Linux)
        } else if id.contains("freebsd") {
            Some(PlatformFamily::FreeBsd)
        } else if id.contains("solaris") || id.contains("sunos") || id.contains("illumos") {
            Some(PlatformFamily::Solaris)
        } else {
            None
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformFamily::MacOs => write!(f, "macos"),
            PlatformFamily::Linux => write!(f, "linux"),
            PlatformFamily::FreeBsd => write!(f, "freebsd"),
            PlatformFamily::Solaris => write!(f, "solaris"),
        }
    }
}

/// Where the platform identifier comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PlatformSource {
    /// The OS this binary was built for.
    #[default]
    Ambient,
    /// The lower-cased output of `uname -s`, for hosts where the build
    /// target does not describe the machine the agent runs on (emulation,
    /// compatibility layers).
    Uname,
    /// An identifier supplied by configuration.
    Fixed(String),
}

/// The platform the sampler runs on. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    identifier: String,
    family: Option<PlatformFamily>,
}

impl PlatformProfile {
    pub fn from_identifier(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let family = PlatformFamily::from_identifier(&identifier);
        Self { identifier, family }
    }

    pub fn ambient() -> Self {
        Self::from_identifier(std::env::consts::OS)
    }

    /// Identifies the platform by running `uname -s`.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::PlatformProbe`] if the command cannot run.
    pub fn probe(runner: &dyn CommandRunner) -> Result<Self> {
        let output = runner
            .run(UNAME_COMMAND)
            .map_err(SamplerError::PlatformProbe)?;
        Ok(Self::from_identifier(output.trim().to_lowercase()))
    }

    pub fn resolve(source: &PlatformSource, runner: &dyn CommandRunner) -> Result<Self> {
        let profile = match source {
            PlatformSource::Ambient => Self::ambient(),
            PlatformSource::Uname => Self::probe(runner)?,
            PlatformSource::Fixed(identifier) => Self::from_identifier(identifier.as_str()),
        };
        match profile.family {
            Some(family) => tracing::debug!(
                identifier = %profile.identifier,
                family = %family,
                "Resolved platform"
            ),
            None => tracing::debug!(identifier = %profile.identifier, "Platform not recognised"),
        }
        Ok(profile)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn family(&self) -> Option<PlatformFamily> {
        self.family
    }
}
