//! Aggregated statistics per probe call site

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Source location that created a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl CallSite {
    /// The location of the caller
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(Location::caller())
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Lock-free counters shared by every probe created at one call site
#[derive(Debug, Default)]
pub struct SiteCounters {
    /// Probes created
    pub instances: AtomicU64,
    /// Bytes read, replays excluded
    pub bytes: AtomicU64,
    /// Reads observed
    pub reads: AtomicU64,
    /// Time spent inside reads
    pub elapsed_nanos: AtomicU64,
}

impl SiteCounters {
    pub(crate) fn record_instance(&self) {
        self.instances.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, new_bytes: u64, elapsed: Duration) {
        self.bytes.fetch_add(new_bytes, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn snapshot(&self, site: CallSite) -> SiteStats {
        SiteStats {
            site,
            instances: self.instances.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            elapsed: Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time totals for one call site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStats {
    pub site: CallSite,
    pub instances: u64,
    pub bytes: u64,
    pub reads: u64,
    pub elapsed: Duration,
}

impl SiteStats {
    /// Bytes per second across all instances
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Statistics keyed by the call site that created each probe
///
/// The process-wide instance from [`StatsRegistry::global`] only grows. Tests
/// and embedders that need isolation create their own registry and attach
/// probes to it explicitly.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    sites: RwLock<HashMap<CallSite, Arc<SiteCounters>>>,
}

impl StatsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the global registry instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceCell<StatsRegistry> = OnceCell::new();
        INSTANCE.get_or_init(Self::new)
    }

    /// Counters for `site`, created on first use
    pub fn counters(&self, site: CallSite) -> Arc<SiteCounters> {
        {
            let sites = self.sites.read().unwrap_or_else(|e| e.into_inner());
            if let Some(counters) = sites.get(&site) {
                return Arc::clone(counters);
            }
        }
        let mut sites = self.sites.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(sites.entry(site).or_default())
    }

    /// Totals for one call site
    pub fn site(&self, site: &CallSite) -> Option<SiteStats> {
        let sites = self.sites.read().unwrap_or_else(|e| e.into_inner());
        sites.get(site).map(|counters| counters.snapshot(*site))
    }

    /// Totals for every call site, ordered by location
    pub fn sites(&self) -> Vec<SiteStats> {
        let sites = self.sites.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = sites
            .iter()
            .map(|(site, counters)| counters.snapshot(*site))
            .collect();
        all.sort_by(|a, b| a.site.cmp(&b.site));
        all
    }

    /// Human-readable report
    pub fn summary(&self) -> String {
        let sites = self.sites();
        if sites.is_empty() {
            return "No probes recorded\n".to_string();
        }

        let mut summary = String::new();
        for stats in &sites {
            summary.push_str(&format!(
                "{}: {} bytes in {} reads over {:.3}s ({:.2} MB/s, {} instances)\n",
                stats.site,
                stats.bytes,
                stats.reads,
                stats.elapsed.as_secs_f64(),
                stats.throughput() / (1024.0 * 1024.0),
                stats.instances
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_site_display() {
        let site = CallSite {
            file: "src/main.rs",
            line: 10,
            column: 5,
        };
        assert_eq!(site.to_string(), "src/main.rs:10:5");
    }

    #[test]
    fn test_caller_points_here() {
        let site = CallSite::caller();
        assert!(site.file.ends_with("registry.rs"));
        assert!(site.line > 0);
    }

    #[test]
    fn test_counters_shared_per_site() {
        let registry = StatsRegistry::new();
        let site = CallSite::caller();

        let first = registry.counters(site);
        let second = registry.counters(site);
        first.record_read(10, Duration::from_millis(1));
        second.record_read(5, Duration::from_millis(1));

        let stats = registry.site(&site).unwrap();
        assert_eq!(stats.bytes, 15);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.elapsed, Duration::from_millis(2));
        assert_eq!(registry.sites().len(), 1);
    }

    #[test]
    fn test_summary_lists_sites() {
        let registry = StatsRegistry::new();
        assert!(registry.summary().contains("No probes"));

        let site = CallSite::caller();
        registry.counters(site).record_instance();
        let summary = registry.summary();
        assert!(summary.contains(&site.to_string()));
        assert!(summary.contains("1 instances"));
    }
}
