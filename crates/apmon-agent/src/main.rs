mod buffer;
mod config;

use anyhow::Result;
use apmon_collector::command::{CommandRunner, ShellCommandRunner};
use apmon_collector::memory::memory_sampler;
use apmon_collector::platform::PlatformProfile;
use apmon_collector::shell::ShellSampler;
use apmon_collector::Collector;
use apmon_common::sink::MetricSink;
use apmon_common::types::{format_labels, MetricSummary};
use buffer::SharedBuffer;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

/// Builds every sampler the config asks for. A sampler that cannot be built
/// is logged and skipped so the others still run.
fn build_collectors(
    config: &config::AgentConfig,
    runner: Arc<dyn CommandRunner>,
    sink: &dyn MetricSink,
) -> Result<Vec<Box<dyn Collector>>> {
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    if config.memory_sampler {
        let source = config.platform.source()?;
        let sampler = PlatformProfile::resolve(&source, &*runner)
            .and_then(|profile| memory_sampler(&profile, Arc::clone(&runner), sink));
        match sampler {
            Ok(sampler) => {
                tracing::info!(
                    command = %sampler.command(),
                    metric = sampler.metric_name(),
                    "Memory sampler ready"
                );
                collectors.push(Box::new(sampler));
            }
            Err(e) => tracing::error!(error = %e, "Memory sampler unavailable"),
        }
    }

    for metric in &config.shell_metrics {
        match ShellSampler::new(
            &metric.name,
            &metric.metric,
            metric.template(),
            Arc::clone(&runner),
            sink,
        ) {
            Ok(sampler) => {
                tracing::info!(
                    name = %metric.name,
                    command = %sampler.command(),
                    metric = %metric.metric,
                    "Shell sampler ready"
                );
                collectors.push(Box::new(sampler));
            }
            Err(e) => tracing::error!(name = %metric.name, error = %e, "Shell sampler unavailable"),
        }
    }

    Ok(collectors)
}

/// Runs one sampling tick. A failing collector never stops the others.
fn collect_all(collectors: &mut [Box<dyn Collector>]) {
    for collector in collectors.iter_mut() {
        if let Err(e) = collector.collect() {
            tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
        }
    }
}

fn report(buffer: &SharedBuffer) -> Vec<MetricSummary> {
    let (points, dropped) = buffer.drain_all();
    if dropped > 0 {
        tracing::warn!(dropped, "Metric buffer overflowed, oldest points dropped");
    }
    if points.is_empty() {
        tracing::debug!("No metrics recorded since last report");
        return Vec::new();
    }

    let summaries = MetricSummary::from_points(&points);
    for summary in &summaries {
        tracing::info!(
            metric = %summary.metric_name,
            labels = %format_labels(&summary.labels),
            count = summary.count,
            min = summary.min,
            max = summary.max,
            mean = summary.mean(),
            last = summary.last,
            "Metric summary"
        );
    }
    summaries
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("apmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = config::AgentConfig::load(&config_path)?;
    tracing::info!(agent_id = %config.agent_id, pid = std::process::id(), "apmon-agent starting");

    let runner: Arc<dyn CommandRunner> =
        Arc::new(ShellCommandRunner::new(config.command_timeout()));
    let buffer = SharedBuffer::new(&config.agent_id, config.buffer_max_size);
    // Resolving the platform may run `uname`, which blocks.
    let mut collectors =
        tokio::task::block_in_place(|| build_collectors(&config, runner, &buffer))?;
    if collectors.is_empty() {
        tracing::warn!("No samplers configured, only idling until shutdown");
    }

    let mut sample_tick = interval(Duration::from_secs(config.sample_interval_secs));
    sample_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report_tick = interval(Duration::from_secs(config.report_interval_secs));
    report_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately; skip it for reports.
    report_tick.tick().await;

    tracing::info!(
        samplers = collectors.len(),
        sample_interval_secs = config.sample_interval_secs,
        report_interval_secs = config.report_interval_secs,
        buffer_max = config.buffer_max_size,
        "Starting sampling loop"
    );

    loop {
        tokio::select! {
            _ = sample_tick.tick() => {
                // Each sampler blocks on an external command.
                tokio::task::block_in_place(|| collect_all(&mut collectors));
                tracing::debug!(buffered = buffer.len(), "Sampling tick complete");
            }
            _ = report_tick.tick() => {
                report(&buffer);
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                report(&buffer);
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apmon_collector::command::CommandError;
    use std::sync::Mutex;

    struct StaticRunner(&'static str);

    impl CommandRunner for StaticRunner {
        fn run(&self, _command: &str) -> Result<String, CommandError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingCollector {
        calls: Arc<Mutex<u32>>,
    }

    impl Collector for FailingCollector {
        fn name(&self) -> &str {
            "failing"
        }

        fn collect(&mut self) -> Result<()> {
            *self.calls.lock().unwrap() += 1;
            anyhow::bail!("boom")
        }
    }

    fn parse_config(toml: &str) -> config::AgentConfig {
        config::AgentConfig::from_toml(toml).unwrap()
    }

    #[test]
    fn unsupported_platform_skips_memory_sampler_only() {
        let config = parse_config(
            r#"
agent_id = "web-01"

[platform]
source = "fixed"
identifier = "windows"

[[shell_metrics]]
name = "threads"
metric = "Process/Threads"
command = "ps -o nlwp {pid}"
"#,
        );
        let buffer = SharedBuffer::new("web-01", 10);
        let runner = Arc::new(StaticRunner("NLWP\n 4\n"));
        let collectors = build_collectors(&config, runner, &buffer).unwrap();
        assert_eq!(collectors.len(), 1);
        assert_eq!(collectors[0].name(), "threads");
    }

    #[test]
    fn failing_collector_does_not_block_others() {
        let config = parse_config(
            r#"
agent_id = "web-01"
[platform]
source = "fixed"
identifier = "linux"
"#,
        );
        let buffer = SharedBuffer::new("web-01", 10);
        let calls = Arc::new(Mutex::new(0));
        let mut collectors: Vec<Box<dyn Collector>> = vec![Box::new(FailingCollector {
            calls: Arc::clone(&calls),
        })];
        let runner = Arc::new(StaticRunner("RSZ\n 2048\n"));
        collectors.extend(build_collectors(&config, runner, &buffer).unwrap());

        collect_all(&mut collectors);
        collect_all(&mut collectors);

        assert_eq!(*calls.lock().unwrap(), 2);
        let summaries = report(&buffer);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].metric_name, "Memory/Physical");
        assert_eq!(format_labels(&summaries[0].labels), "unit=MiB");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].last, 2.0);
        assert!(report(&buffer).is_empty());
    }

    #[test]
    fn disabled_memory_sampler_stops_recording() {
        let config = parse_config(
            r#"
agent_id = "web-01"
[platform]
source = "fixed"
identifier = "darwin"
"#,
        );
        let buffer = SharedBuffer::new("web-01", 10);
        let runner = Arc::new(StaticRunner("RSZ\n 0\n"));
        let mut collectors = build_collectors(&config, runner, &buffer).unwrap();
        assert_eq!(collectors.len(), 1);

        collect_all(&mut collectors);
        collect_all(&mut collectors);

        assert!(report(&buffer).is_empty());
    }

    #[test]
    fn memory_sampler_can_be_turned_off() {
        let config = parse_config("agent_id = \"web-01\"\nmemory_sampler = false");
        let buffer = SharedBuffer::new("web-01", 10);
        let collectors = build_collectors(&config, Arc::new(StaticRunner("")), &buffer).unwrap();
        assert!(collectors.is_empty());
    }
}
