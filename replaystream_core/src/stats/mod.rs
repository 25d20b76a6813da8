//! Throughput probes
//!
//! A [`StatsProbe`] passes bytes through unchanged and times every read. Each
//! probe keeps its own totals and also feeds the counters of the call site
//! that created it, in either the global [`StatsRegistry`] or one supplied by
//! the caller.

pub mod registry;

pub use registry::{CallSite, SiteCounters, SiteStats, StatsRegistry};

use crate::Result;
use crate::error::ProtocolError;
use crate::source::{ByteSource, MarkLimit};
use log::{debug, trace};
use serde::Serialize;
use std::panic::Location;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Totals of one probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub site: CallSite,
    pub bytes: u64,
    pub reads: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Bytes per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }

    /// Mean bytes per read
    pub fn average_read_size(&self) -> f64 {
        if self.reads > 0 {
            self.bytes as f64 / self.reads as f64
        } else {
            0.0
        }
    }
}

/// Pass-through source that measures reads
pub struct StatsProbe<S> {
    source: S,
    site: CallSite,
    counters: Arc<SiteCounters>,
    bytes: u64,
    high_water: u64,
    mark_bytes: Option<u64>,
    reads: u64,
    elapsed: Duration,
    closed: bool,
}

impl<S: ByteSource> StatsProbe<S> {
    /// Probe `source`, reporting to the global registry
    #[track_caller]
    pub fn new(source: S) -> Self {
        Self::attach(source, StatsRegistry::global(), Location::caller())
    }

    /// Probe `source`, reporting to `registry`
    #[track_caller]
    pub fn with_registry(source: S, registry: &StatsRegistry) -> Self {
        Self::attach(source, registry, Location::caller())
    }

    fn attach(source: S, registry: &StatsRegistry, location: &'static Location<'static>) -> Self {
        let site = CallSite::from(location);
        let counters = registry.counters(site);
        counters.record_instance();
        trace!("Probe attached at {site}");

        Self {
            source,
            site,
            counters,
            bytes: 0,
            high_water: 0,
            mark_bytes: None,
            reads: 0,
            elapsed: Duration::ZERO,
            closed: false,
        }
    }

    /// Bytes read so far; rolls back on `reset`
    pub fn size(&self) -> u64 {
        self.bytes
    }

    /// Time spent inside reads
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of reads
    pub fn read_count(&self) -> u64 {
        self.reads
    }

    /// Bytes per second
    pub fn throughput(&self) -> f64 {
        self.snapshot().throughput()
    }

    /// Mean bytes per read
    pub fn average_read_size(&self) -> f64 {
        self.snapshot().average_read_size()
    }

    /// Where the probe was created
    pub fn call_site(&self) -> CallSite {
        self.site
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            site: self.site,
            bytes: self.bytes,
            reads: self.reads,
            elapsed: self.elapsed,
        }
    }

    /// Borrow the wrapped source
    pub fn get_ref(&self) -> &S {
        &self.source
    }

    /// Unwrap
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: ByteSource> ByteSource for StatsProbe<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(ProtocolError::closed("stats").into());
        }

        let started = Instant::now();
        let n = self.source.read(buf)?;
        let took = started.elapsed();

        self.elapsed += took;
        self.reads += 1;
        self.bytes += n as u64;

        let fresh = self.bytes.saturating_sub(self.high_water);
        self.high_water = self.high_water.max(self.bytes);
        self.counters.record_read(fresh, took);
        Ok(n)
    }

    fn mark_supported(&self) -> bool {
        self.source.mark_supported()
    }

    fn mark(&mut self, limit: MarkLimit) -> Result<()> {
        self.source.mark(limit)?;
        self.mark_bytes = Some(self.bytes);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        if let Some(bytes) = self.mark_bytes {
            self.bytes = bytes;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(
            "Probe {} closed: {} bytes in {} reads over {:?}",
            self.site, self.bytes, self.reads, self.elapsed
        );
        self.source.close()
    }

    fn layer(&self) -> &'static str {
        "stats"
    }
}
