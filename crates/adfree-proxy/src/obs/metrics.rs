//! Label-keyed metric families for the proxy.
//!
//! Each family maps a sorted label set to an atomic cell in a `DashMap`, so
//! `inc(&[("a","1"),("b","2")])` and `inc(&[("b","2"),("a","1")])` hit the
//! same series. Histograms use fixed microsecond buckets.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn label_str(key: &[(String, String)]) -> String {
    let mut out = String::new();
    for (i, (k, v)) in key.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let v = v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
        let _ = write!(out, "{k}=\"{v}\"");
    }
    out
}

/// Series storage shared by all metric kinds.
struct Family<V> {
    series: DashMap<LabelKey, V>,
}

impl<V: Default> Default for Family<V> {
    fn default() -> Self {
        Self {
            series: DashMap::new(),
        }
    }
}

impl<V: Default> Family<V> {
    fn with<R>(&self, labels: &[(&str, &str)], f: impl FnOnce(&V) -> R) -> R {
        let cell = self.series.entry(label_key(labels)).or_insert_with(V::default);
        f(cell.value())
    }

    fn peek<R>(&self, labels: &[(&str, &str)], f: impl FnOnce(&V) -> R) -> Option<R> {
        self.series.get(&label_key(labels)).map(|cell| f(cell.value()))
    }
}

#[derive(Default)]
pub struct CounterVec {
    family: Family<AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        self.family.with(labels, |c| c.fetch_add(v, Ordering::Relaxed));
    }

    /// Value of one exact series; 0 if never touched.
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.family
            .peek(labels, |c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.family
            .series
            .iter()
            .map(|s| s.value().load(Ordering::Relaxed))
            .sum()
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for s in self.family.series.iter() {
            let _ = writeln!(out, "{name}{{{}}} {}", label_str(s.key()), s.value().load(Ordering::Relaxed));
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    family: Family<AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        self.family.with(labels, |g| g.fetch_add(v, Ordering::Relaxed));
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.family
            .peek(labels, |g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge");
        for s in self.family.series.iter() {
            let _ = writeln!(out, "{name}{{{}}} {}", label_str(s.key()), s.value().load(Ordering::Relaxed));
        }
    }
}

const BUCKET_COUNT: usize = 8;
/// Upper bounds, microseconds.
const BUCKETS_MICROS: [u64; BUCKET_COUNT] = [50, 100, 250, 500, 1_000, 5_000, 25_000, 250_000];

#[derive(Default)]
struct Buckets {
    count: AtomicU64,
    sum: AtomicU64,
    le: [AtomicU64; BUCKET_COUNT],
}

#[derive(Default)]
pub struct HistogramVec {
    family: Family<Buckets>,
}

impl HistogramVec {
    pub fn observe(&self, labels: &[(&str, &str)], elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.family.with(labels, |h| {
            h.count.fetch_add(1, Ordering::Relaxed);
            h.sum.fetch_add(micros, Ordering::Relaxed);
            for (bound, cell) in BUCKETS_MICROS.iter().zip(h.le.iter()) {
                if micros <= *bound {
                    cell.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.family
            .peek(labels, |h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for s in self.family.series.iter() {
            let h = s.value();
            let labels = label_str(s.key());
            let sep = if labels.is_empty() { "" } else { "," };
            let count = h.count.load(Ordering::Relaxed);

            for (bound, cell) in BUCKETS_MICROS.iter().zip(h.le.iter()) {
                let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"{bound}\"}} {}", cell.load(Ordering::Relaxed));
            }
            let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"+Inf\"}} {count}");
            let _ = writeln!(out, "{name}_sum{{{labels}}} {}", h.sum.load(Ordering::Relaxed));
            let _ = writeln!(out, "{name}_count{{{labels}}} {count}");
        }
    }
}

/// Every metric the proxy exports.
#[derive(Default)]
pub struct ProxyMetrics {
    /// method, path
    pub requests: CounterVec,
    /// reason, domain
    pub blocked: CounterVec,
    /// origin, error_type
    pub validation_errors: CounterVec,
    /// endpoint, status
    pub reports_sent: CounterVec,
    /// endpoint, reason
    pub reports_failed: CounterVec,
    /// reason
    pub reports_dropped: CounterVec,
    /// endpoint
    pub reports_in_flight: GaugeVec,
    /// mode
    pub rewrite_duration: HistogramVec,
    draining: AtomicBool,
}

impl ProxyMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Prometheus text for all families, then `extra` as bare gauges.
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.requests.render("adfree_requests_total", &mut out);
        self.blocked.render("adfree_blocked_total", &mut out);
        self.validation_errors
            .render("adfree_policy_validation_errors_total", &mut out);
        self.reports_sent.render("adfree_reports_sent_total", &mut out);
        self.reports_failed.render("adfree_reports_failed_total", &mut out);
        self.reports_dropped.render("adfree_reports_dropped_total", &mut out);
        self.reports_in_flight.render("adfree_reports_in_flight", &mut out);
        self.rewrite_duration
            .render("adfree_rewrite_duration_micros", &mut out);

        let _ = writeln!(out, "# TYPE adfree_draining gauge");
        let _ = writeln!(out, "adfree_draining {}", u8::from(self.is_draining()));
        for (name, value) in extra {
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_keyed_by_sorted_labels() {
        let m = ProxyMetrics::default();
        m.blocked.inc(&[("reason", "blocked_domain"), ("domain", "ads.example.com")]);
        m.blocked.inc(&[("domain", "ads.example.com"), ("reason", "blocked_domain")]);

        assert_eq!(m.blocked.get(&[("reason", "blocked_domain"), ("domain", "ads.example.com")]), 2);
        assert_eq!(m.blocked.total(), 2);

        let out = m.render(&[("adfree_policy_cache_entries", 3)]);
        assert!(out.contains("adfree_blocked_total{domain=\"ads.example.com\",reason=\"blocked_domain\"} 2"));
        assert!(out.contains("adfree_policy_cache_entries 3"));
        assert!(out.contains("adfree_draining 0"));
    }

    #[test]
    fn gauges_go_both_ways() {
        let g = GaugeVec::default();
        g.inc(&[("endpoint", "e")]);
        g.inc(&[("endpoint", "e")]);
        g.dec(&[("endpoint", "e")]);
        assert_eq!(g.get(&[("endpoint", "e")]), 1);
        assert_eq!(g.get(&[("endpoint", "other")]), 0);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let h = HistogramVec::default();
        h.observe(&[("mode", "strict")], Duration::from_micros(700));
        assert_eq!(h.count(&[("mode", "strict")]), 1);

        let mut out = String::new();
        h.render("x", &mut out);
        assert!(out.contains("x_bucket{mode=\"strict\",le=\"500\"} 0"));
        assert!(out.contains("x_bucket{mode=\"strict\",le=\"1000\"} 1"));
        assert!(out.contains("x_bucket{mode=\"strict\",le=\"+Inf\"} 1"));
        assert!(out.contains("x_sum{mode=\"strict\"} 700"));
    }
}
