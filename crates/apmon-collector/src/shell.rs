//! Periodic sampler that reads one number from an external command.

use crate::command::{CommandError, CommandRunner};
use crate::error::{Result, SamplerError};
use crate::template::CommandTemplate;
use crate::Collector;
use apmon_common::sink::{MetricSink, Recorder};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Active,
    /// Terminal. Reached after a non-positive reading or a timed-out command.
    Disabled,
}

/// Runs a [`CommandTemplate`] once per tick and records the reading.
///
/// A reading that is zero or negative (including output that cannot be
/// parsed) means the command does not work for this process, and the
/// sampler disables itself for good. Running out of memory while spawning
/// the command only skips the tick.
pub struct ShellSampler {
    name: String,
    metric_name: String,
    template: CommandTemplate,
    command: String,
    runner: Arc<dyn CommandRunner>,
    record: Recorder,
    state: SamplerState,
}

impl ShellSampler {
    /// Validates `template`, renders it for the current process and
    /// registers `metric_name` with `sink` in the template's unit.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::InvalidTemplate`] if the template is unusable.
    /// Nothing is registered in that case.
    pub fn new(
        name: &str,
        metric_name: &str,
        template: CommandTemplate,
        runner: Arc<dyn CommandRunner>,
        sink: &dyn MetricSink,
    ) -> Result<Self> {
        template.validate()?;
        let command = template.render(std::process::id());
        let record = sink.register_sampled(metric_name, &template.unit);
        tracing::debug!(
            sampler = name,
            metric = metric_name,
            command = %command,
            "Registered shell sampler"
        );
        Ok(Self {
            name: name.to_string(),
            metric_name: metric_name.to_string(),
            template,
            command,
            runner,
            record,
            state: SamplerState::Active,
        })
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// The rendered command line this sampler executes.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn is_disabled(&self) -> bool {
        self.state == SamplerState::Disabled
    }

    /// Takes one reading.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Command`] when the command fails for any
    /// reason other than memory exhaustion or a timeout. The sampler stays
    /// active.
    pub fn sample(&mut self) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }

        let output = match self.runner.run(&self.command) {
            Ok(output) => output,
            Err(CommandError::ResourceExhausted(reason)) => {
                tracing::error!(
                    sampler = %self.name,
                    command = %self.command,
                    reason = %reason,
                    "Out of memory while sampling, skipping this tick"
                );
                return Ok(());
            }
            Err(CommandError::TimedOut { timeout, .. }) => {
                tracing::error!(
                    sampler = %self.name,
                    command = %self.command,
                    timeout = ?timeout,
                    "Sampling command timed out, disabling sampler"
                );
                self.state = SamplerState::Disabled;
                return Ok(());
            }
            Err(source) => {
                return Err(SamplerError::Command {
                    command: self.command.clone(),
                    source,
                });
            }
        };

        let value = self.template.parse_reading(&output);
        if value > 0.0 {
            (self.record)(value);
        } else {
            tracing::error!(
                sampler = %self.name,
                command = %self.command,
                value,
                "Sampler returned non-positive result, disabling sampler"
            );
            self.state = SamplerState::Disabled;
        }
        Ok(())
    }
}

impl Collector for ShellSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&mut self) -> anyhow::Result<()> {
        self.sample()?;
        Ok(())
    }
}
