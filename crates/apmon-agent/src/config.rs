use anyhow::{bail, Context};
use apmon_collector::platform::PlatformSource;
use apmon_collector::template::CommandTemplate;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default = "default_buffer_max_size")]
    pub buffer_max_size: usize,
    /// Sampling commands running longer than this are killed; 0 means no limit
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default = "default_memory_sampler")]
    pub memory_sampler: bool,
    #[serde(default)]
    pub shell_metrics: Vec<ShellMetricConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub source: PlatformSourceKind,
    /// Required when `source = "fixed"`
    pub identifier: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformSourceKind {
    #[default]
    Ambient,
    Uname,
    Fixed,
}

impl PlatformConfig {
    pub fn source(&self) -> anyhow::Result<PlatformSource> {
        Ok(match self.source {
            PlatformSourceKind::Ambient => PlatformSource::Ambient,
            PlatformSourceKind::Uname => PlatformSource::Uname,
            PlatformSourceKind::Fixed => match self.identifier.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => PlatformSource::Fixed(id.to_string()),
                _ => bail!("platform.identifier is required when platform.source = \"fixed\""),
            },
        })
    }
}

/// An extra metric read from an arbitrary shell command.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellMetricConfig {
    pub name: String,
    pub metric: String,
    /// `{pid}` is replaced with the agent's process id
    pub command: String,
    #[serde(default = "default_line")]
    pub line: usize,
    #[serde(default)]
    pub field: usize,
    #[serde(default = "default_divisor")]
    pub divisor: f64,
    #[serde(default)]
    pub unit: String,
}

impl ShellMetricConfig {
    pub fn template(&self) -> CommandTemplate {
        CommandTemplate::new(self.command.as_str())
            .with_line(self.line)
            .with_field(self.field)
            .with_divisor(self.divisor)
            .with_unit(self.unit.as_str())
    }
}

fn default_sample_interval() -> u64 {
    10
}

fn default_report_interval() -> u64 {
    60
}

fn default_buffer_max_size() -> usize {
    1000
}

fn default_command_timeout() -> u64 {
    5
}

fn default_memory_sampler() -> bool {
    true
}

fn default_line() -> usize {
    1
}

fn default_divisor() -> f64 {
    1.0
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        Self::from_toml(&content).with_context(|| format!("invalid config file {path}"))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent_id.trim().is_empty() {
            bail!("agent_id must not be empty");
        }
        if self.sample_interval_secs == 0 {
            bail!("sample_interval_secs must be greater than 0");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be greater than 0");
        }
        if self.buffer_max_size == 0 {
            bail!("buffer_max_size must be greater than 0");
        }
        self.platform.source()?;
        for metric in &self.shell_metrics {
            metric
                .template()
                .validate()
                .with_context(|| format!("shell metric '{}'", metric.name))?;
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = AgentConfig::from_toml("agent_id = \"web-01\"").unwrap();
        assert_eq!(config.sample_interval_secs, 10);
        assert_eq!(config.report_interval_secs, 60);
        assert_eq!(config.buffer_max_size, 1000);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(5)));
        assert!(config.memory_sampler);
        assert!(config.shell_metrics.is_empty());
        assert_eq!(config.platform.source().unwrap(), PlatformSource::Ambient);
    }

    #[test]
    fn example_config_parses() {
        let example = include_str!("../../../config/agent.example.toml");
        let config = AgentConfig::from_toml(example).unwrap();
        assert_eq!(config.agent_id, "web-01");
        assert_eq!(config.shell_metrics.len(), 1);
        let template = config.shell_metrics[0].template();
        assert_eq!(template.line, 0);
        assert_eq!(template.field, 1);
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let config = AgentConfig::from_toml("agent_id = \"a\"\ncommand_timeout_secs = 0").unwrap();
        assert_eq!(config.command_timeout(), None);
    }

    #[test]
    fn fixed_platform_requires_identifier() {
        let err =
            AgentConfig::from_toml("agent_id = \"a\"\n[platform]\nsource = \"fixed\"").unwrap_err();
        assert!(err.to_string().contains("platform.identifier"));

        let config = AgentConfig::from_toml(
            "agent_id = \"a\"\n[platform]\nsource = \"fixed\"\nidentifier = \"freebsd\"",
        )
        .unwrap();
        assert_eq!(
            config.platform.source().unwrap(),
            PlatformSource::Fixed("freebsd".to_string())
        );
    }

    #[test]
    fn uname_platform_source_parses() {
        let config =
            AgentConfig::from_toml("agent_id = \"a\"\n[platform]\nsource = \"uname\"").unwrap();
        assert_eq!(config.platform.source().unwrap(), PlatformSource::Uname);
    }

    #[test]
    fn rejects_zero_intervals_and_buffer() {
        for bad in [
            "agent_id = \"a\"\nsample_interval_secs = 0",
            "agent_id = \"a\"\nreport_interval_secs = 0",
            "agent_id = \"a\"\nbuffer_max_size = 0",
            "agent_id = \"  \"",
        ] {
            assert!(AgentConfig::from_toml(bad).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn rejects_shell_metric_with_bad_divisor() {
        let err = AgentConfig::from_toml(
            r#"
agent_id = "a"

[[shell_metrics]]
name = "x"
metric = "X/y"
command = "echo 1"
divisor = 0.0
"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("divisor"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "agent_id = \"disk-01\"\nsample_interval_secs = 30").unwrap();
        let config = AgentConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.agent_id, "disk-01");
        assert_eq!(config.sample_interval_secs, 30);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AgentConfig::load("/nonexistent/apmon/agent.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/apmon/agent.toml"));
    }
}
