use crate::command::CommandRunner;
use crate::error::{Result, SamplerError};
use crate::platform::{PlatformFamily, PlatformProfile};
use crate::shell::ShellSampler;
use crate::template::CommandTemplate;
use apmon_common::sink::MetricSink;
use std::sync::Arc;

pub const MEMORY_PHYSICAL_METRIC: &str = "Memory/Physical";

const KIB_PER_MIB: f64 = 1024.0;

/// Process-status command reporting resident set size in KiB for `family`.
pub fn rss_template(family: PlatformFamily) -> CommandTemplate {
    let command = match family {
        PlatformFamily::MacOs | PlatformFamily::Linux => "ps -o rsz {pid}",
        PlatformFamily::FreeBsd => "ps -o rss {pid}",
        PlatformFamily::Solaris => "/usr/bin/ps -o rss -p {pid}",
    };
    CommandTemplate::new(command)
        .with_line(1)
        .with_field(0)
        .with_divisor(KIB_PER_MIB)
        .with_unit("MiB")
}

/// Builds the sampler recording this process's resident memory, in MiB,
/// as [`MEMORY_PHYSICAL_METRIC`].
///
/// # Errors
///
/// Returns [`SamplerError::UnsupportedPlatform`] when `profile` has no
/// known process-status command. The sink is left untouched.
pub fn memory_sampler(
    profile: &PlatformProfile,
    runner: Arc<dyn CommandRunner>,
    sink: &dyn MetricSink,
) -> Result<ShellSampler> {
    let family = profile
        .family()
        .ok_or_else(|| SamplerError::UnsupportedPlatform(profile.identifier().to_string()))?;
    ShellSampler::new("memory", MEMORY_PHYSICAL_METRIC, rss_template(family), runner, sink)
}
