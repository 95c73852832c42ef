use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::trend::{TrendSamples, TrendSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: MetricValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge {
        value: i64,
        max: i64,
    },
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Trend(TrendSummary),
}

impl MetricValue {
    pub fn rate(total: u64, hits: u64) -> Self {
        let rate = (total > 0).then(|| hits as f64 / total as f64);
        MetricValue::Rate { total, hits, rate }
    }
}

#[derive(Debug, Default)]
pub struct Rate {
    pub total: AtomicU64,
    pub hits: AtomicU64,
}

#[derive(Debug, Default)]
pub struct Gauge {
    pub value: AtomicI64,
    pub max: AtomicI64,
}

impl Gauge {
    fn raise_max(&self, candidate: i64) {
        // CAS loop to keep the max without races.
        let mut cur = self.max.load(Ordering::Relaxed);
        while candidate > cur {
            match self.max.compare_exchange_weak(
                cur,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }
}

#[derive(Debug)]
pub enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<Gauge>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<TrendSamples>>),
}

impl MetricStorage {
    pub fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricStorage::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => MetricStorage::Gauge(Arc::new(Gauge::default())),
            MetricKind::Rate => MetricStorage::Rate(Arc::new(Rate::default())),
            MetricKind::Trend => MetricStorage::Trend(Arc::new(Mutex::new(TrendSamples::new()))),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            MetricStorage::Counter(a) => MetricHandle::Counter(a.clone()),
            MetricStorage::Gauge(a) => MetricHandle::Gauge(a.clone()),
            MetricStorage::Rate(a) => MetricHandle::Rate(a.clone()),
            MetricStorage::Trend(a) => MetricHandle::Trend(a.clone()),
        }
    }

    pub(crate) fn value(&self) -> MetricValue {
        match self {
            MetricStorage::Counter(a) => MetricValue::Counter(a.load(Ordering::Relaxed)),
            MetricStorage::Gauge(g) => MetricValue::Gauge {
                value: g.value.load(Ordering::Relaxed),
                max: g.max.load(Ordering::Relaxed),
            },
            MetricStorage::Rate(r) => {
                let hits = r.hits.load(Ordering::Acquire);
                MetricValue::rate(r.total.load(Ordering::Relaxed), hits)
            }
            MetricStorage::Trend(t) => MetricValue::Trend(t.lock().summarize()),
        }
    }
}

/// Write handle to one metric series. Cloning is cheap (shares the accumulator).
///
/// Writes of the wrong kind are ignored; kinds are fixed at registration.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<Gauge>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<TrendSamples>>),
}

impl MetricHandle {
    #[inline]
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
            MetricHandle::Rate(_) => MetricKind::Rate,
            MetricHandle::Trend(_) => MetricKind::Trend,
        }
    }

    #[inline]
    pub fn increment(&self, value: u64) {
        if let MetricHandle::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.value.store(value, Ordering::Relaxed);
            g.raise_max(value);
        }
    }

    #[inline]
    pub fn add_gauge(&self, delta: i64) {
        if let MetricHandle::Gauge(g) = self {
            let new_value = g.value.fetch_add(delta, Ordering::Relaxed).saturating_add(delta);
            g.raise_max(new_value);
        }
    }

    #[inline]
    pub fn add_rate(&self, hit: bool) {
        if let MetricHandle::Rate(r) = self {
            // `total` first; readers load `hits` first so they never see hits > total.
            r.total.fetch_add(1, Ordering::Relaxed);
            if hit {
                r.hits.fetch_add(1, Ordering::Release);
            }
        }
    }

    #[inline]
    pub fn observe(&self, value: f64) {
        if let MetricHandle::Trend(t) = self {
            t.lock().push(value);
        }
    }

    pub fn get_counter(&self) -> u64 {
        if let MetricHandle::Counter(c) = self {
            c.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn get_gauge(&self) -> i64 {
        if let MetricHandle::Gauge(g) = self {
            g.value.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// `(total, hits)`
    pub fn get_rate(&self) -> (u64, u64) {
        if let MetricHandle::Rate(r) = self {
            let hits = r.hits.load(Ordering::Acquire);
            (r.total.load(Ordering::Relaxed), hits)
        } else {
            (0, 0)
        }
    }
}
