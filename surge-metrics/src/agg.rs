use smallvec::SmallVec;

use crate::key::KeyId;
use crate::metrics::{MetricStorage, MetricValue};
use crate::registry::{MetricId, Registry};
use crate::tags::TagSet;
use crate::trend::{TrendSamples, TrendSummary};

#[derive(Debug, Clone, Copy)]
enum TagFilter {
    Eq(KeyId, KeyId),
    NotEq(KeyId, KeyId),
    Has(KeyId),
    Missing(KeyId),
}

impl TagFilter {
    fn matches(&self, tags: &TagSet) -> bool {
        match *self {
            TagFilter::Eq(k, v) => tags.get(k) == Some(v),
            TagFilter::NotEq(k, v) => tags.get(k) != Some(v),
            TagFilter::Has(k) => tags.get(k).is_some(),
            TagFilter::Missing(k) => tags.get(k).is_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
}

impl CounterSnapshot {
    pub fn new(total: u64) -> Self {
        Self { total }
    }

    pub fn delta_since(self, prev: Option<Self>) -> u64 {
        match prev {
            Some(prev) => self.total.saturating_sub(prev.total),
            None => self.total,
        }
    }

    pub fn per_sec_since(self, prev: Option<Self>, dt_secs: f64) -> f64 {
        per_sec(self.delta_since(prev), dt_secs)
    }
}

#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    // Clamp so a zero-length interval cannot divide by zero.
    let dt = dt_secs.max(1e-9);
    delta as f64 / dt
}

/// Summed rate samples across the series matched by a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateTotals {
    pub total: u64,
    pub hits: u64,
}

impl RateTotals {
    pub fn rate(self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }

    pub fn misses(self) -> u64 {
        self.total.saturating_sub(self.hits)
    }
}

/// Tag-filtered read over every series of one metric.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    filters: SmallVec<[TagFilter; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_eq(mut self, key: KeyId, value: KeyId) -> Self {
        self.filters.push(TagFilter::Eq(key, value));
        self
    }

    #[must_use]
    pub fn where_not_eq(mut self, key: KeyId, value: KeyId) -> Self {
        self.filters.push(TagFilter::NotEq(key, value));
        self
    }

    #[must_use]
    pub fn where_has(mut self, key: KeyId) -> Self {
        self.filters.push(TagFilter::Has(key));
        self
    }

    #[must_use]
    pub fn where_missing(mut self, key: KeyId) -> Self {
        self.filters.push(TagFilter::Missing(key));
        self
    }

    /// Equality filters from string pairs (e.g. a threshold's `{name:process}` selector).
    #[must_use]
    pub fn where_tags(mut self, tags: &[(String, String)]) -> Self {
        for (k, v) in tags {
            let k = self.registry.resolve_key(k);
            let v = self.registry.resolve_key(v);
            self.filters.push(TagFilter::Eq(k, v));
        }
        self
    }

    fn matches(&self, tags: &TagSet) -> bool {
        self.filters.iter().all(|f| f.matches(tags))
    }

    /// Sum over matched series; `None` when no matched series has counted anything.
    pub fn sum_counter(self) -> Option<u64> {
        let mut out: Option<u64> = None;

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Counter(c) = storage else {
                return;
            };

            let v = c.load(std::sync::atomic::Ordering::Relaxed);
            if v == 0 {
                return;
            }

            out = Some(out.unwrap_or(0).saturating_add(v));
        });

        out
    }

    pub fn sum_counter_total(self) -> u64 {
        self.sum_counter().unwrap_or(0)
    }

    pub fn sum_rate(self) -> RateTotals {
        let mut out = RateTotals::default();
        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            if let MetricValue::Rate { total, hits, .. } = rate_value(storage) {
                out.total = out.total.saturating_add(total);
                out.hits = out.hits.saturating_add(hits);
            }
        });
        out
    }

    /// Largest observed gauge value across matched series.
    pub fn gauge_max(self) -> Option<i64> {
        let mut out: Option<i64> = None;
        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            if let MetricStorage::Gauge(g) = storage {
                let max = g.max.load(std::sync::atomic::Ordering::Relaxed);
                out = Some(out.map_or(max, |cur| cur.max(max)));
            }
        });
        out
    }

    /// Current gauge value summed across matched series.
    pub fn gauge_sum(self) -> i64 {
        let mut out = 0i64;
        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            if let MetricStorage::Gauge(g) = storage {
                out = out.saturating_add(g.value.load(std::sync::atomic::Ordering::Relaxed));
            }
        });
        out
    }

    /// All trend samples of the matched series, merged.
    pub fn merge_trend(self) -> TrendSamples {
        let mut acc = TrendSamples::new();
        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Trend(t) = storage else {
                return;
            };
            acc.extend_from(&t.lock());
        });
        acc
    }

    pub fn merge_trend_summary(self) -> Option<TrendSummary> {
        let mut merged = self.merge_trend();
        if merged.is_empty() {
            return None;
        }
        Some(merged.summarize())
    }
}

fn rate_value(storage: &MetricStorage) -> MetricValue {
    match storage {
        MetricStorage::Rate(_) => storage.value(),
        _ => MetricValue::Counter(0),
    }
}
