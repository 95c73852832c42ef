//! Trend sample retention and percentile math.
//!
//! Trends keep every sample (no streaming estimator), so aggregates are exact and
//! reproducible for a given sample set regardless of the order samples arrived in.
//!
//! Percentiles use linear interpolation between closest ranks:
//! `rank = p / 100 * (n - 1)`, `value = s[floor(rank)] + (s[ceil(rank)] - s[floor(rank)]) * frac(rank)`
//! over the ascending-sorted samples `s`.

/// Retained samples of one trend series.
#[derive(Debug, Clone, Default)]
pub struct TrendSamples {
    values: Vec<f64>,
    sorted: bool,
}

impl TrendSamples {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            sorted: true,
        }
    }

    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut out = Self::new();
        for v in values {
            out.push(v);
        }
        out
    }

    /// Append one sample. Non-finite values are dropped.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if let Some(last) = self.values.last()
            && *last > value
        {
            self.sorted = false;
        }
        self.values.push(value);
    }

    pub fn extend_from(&mut self, other: &TrendSamples) {
        for v in &other.values {
            self.push(*v);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn sort(&mut self) {
        if !self.sorted {
            self.values.sort_unstable_by(f64::total_cmp);
            self.sorted = true;
        }
    }

    /// Percentile `p` in `0..=100`.
    pub fn percentile(&mut self, p: f64) -> Option<f64> {
        self.sort();
        percentile_sorted(&self.values, p)
    }

    pub fn summarize(&mut self) -> TrendSummary {
        self.sort();
        let v = &self.values;
        let count = v.len() as u64;
        if v.is_empty() {
            return TrendSummary {
                count,
                ..TrendSummary::default()
            };
        }

        let sum: f64 = v.iter().sum();
        TrendSummary {
            count,
            min: v.first().copied(),
            max: v.last().copied(),
            avg: Some(sum / v.len() as f64),
            med: percentile_sorted(v, 50.0),
            p90: percentile_sorted(v, 90.0),
            p95: percentile_sorted(v, 95.0),
            p99: percentile_sorted(v, 99.0),
        }
    }
}

/// Aggregates of one trend (or a merge of several trend series).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

/// Linear-interpolated percentile over ascending-sorted samples.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !p.is_finite() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);

    let rank = p * (sorted.len() - 1) as f64 / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let lo_v = sorted[lo];
    let hi_v = sorted[hi.min(sorted.len() - 1)];

    Some(lo_v + (hi_v - lo_v) * (rank - lo as f64))
}
