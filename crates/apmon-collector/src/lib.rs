//! Metric samplers for the apmon agent.
//!
//! Each [`Collector`] implementation measures something about the current
//! process and records it into a [`MetricSink`](apmon_common::sink::MetricSink)
//! through a recorder it registered when it was built. The agent's scheduler
//! drives every collector once per sampling tick.

pub mod command;
pub mod datastore;
pub mod error;
pub mod memory;
pub mod platform;
pub mod shell;
pub mod template;


use anyhow::Result;

pub use error::SamplerError;

/// A periodic sampler driven by the agent's collection loop.
///
/// The scheduler calls [`Collector::collect`] once per tick and isolates
/// failures: an error from one collector is logged and never stops the loop
/// or the other collectors.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"memory"`), used for logging.
    fn name(&self) -> &str;

    /// Takes one measurement and hands it to the sink.
    ///
    /// # Errors
    ///
    /// Returns an error for failures the collector cannot recover from
    /// locally. The collector stays usable for the next tick.
    fn collect(&mut self) -> Result<()>;
}
