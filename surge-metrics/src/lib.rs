pub mod agg;
pub mod error;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod tags;
pub mod trend;

pub use agg::{CounterSnapshot, Query, RateTotals, per_sec};
pub use error::{Error, Result};
pub use key::KeyId;
pub use metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricValue};
pub use registry::{MetricId, Registry};
pub use tags::TagSet;
pub use trend::{TrendSamples, TrendSummary, percentile_sorted};
