use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agg::Query;
use crate::error::{Error, Result};
use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
pub struct MetricDef {
    pub name: KeyId,
    pub kind: MetricKind,
}

type SeriesMap = DashMap<TagSet, MetricStorage, ahash::RandomState>;

/// Run-scoped metric registry.
///
/// One accumulator exists per `(metric, tag set)`. Counters, gauges and rates are atomics;
/// trend series append under their own mutex, so writers only contend on the same series.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, SeriesMap, ahash::RandomState>,
}

impl Registry {
    /// Register (or look up) a metric.
    ///
    /// Registering an existing name with the same kind returns the existing id; a different
    /// kind is a configuration error.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        if name.trim().is_empty() {
            return Err(Error::EmptyName);
        }
        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some((idx, def)) = defs.iter().enumerate().find(|(_, d)| d.name == name_id) {
            if def.kind != kind {
                return Err(Error::KindMismatch {
                    name: name.to_string(),
                    registered: def.kind,
                    requested: kind,
                });
            }
            return Ok(MetricId(idx as u32));
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, SeriesMap::default());
        Ok(id)
    }

    pub fn lookup_metric(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.get(name)?;
        let defs = self.defs.read();
        defs.iter()
            .enumerate()
            .find(|(_, d)| d.name == name_id)
            .map(|(idx, d)| (MetricId(idx as u32), d.kind))
    }

    pub fn kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn metric_name(&self, metric: MetricId) -> Option<String> {
        let name = self.defs.read().get(metric.0 as usize)?.name;
        self.interner.resolve(name).map(|s| s.to_string())
    }

    /// All registered metrics in registration order.
    pub fn metrics(&self) -> Vec<(MetricId, String, MetricKind)> {
        let defs = self.defs.read();
        defs.iter()
            .enumerate()
            .map(|(idx, d)| {
                let name = self
                    .interner
                    .resolve(d.name)
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                (MetricId(idx as u32), name, d.kind)
            })
            .collect()
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    /// Write handle for one series, creating the series on first use.
    pub fn get_handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        // Read the kind before touching storage; `register` holds `defs` while inserting.
        let kind = self.kind(metric)?;
        let series_map = self.storage.get(&metric)?;

        if let Some(storage) = series_map.get(&tags) {
            return Some(storage.handle());
        }

        // `entry` keeps creation atomic: concurrent first writers share one accumulator.
        let storage = series_map
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    pub(crate) fn visit_series(
        &self,
        metric: MetricId,
        mut f: impl FnMut(&TagSet, &MetricStorage),
    ) {
        let Some(series_map) = self.storage.get(&metric) else {
            return;
        };
        for series in series_map.iter() {
            f(series.key(), series.value());
        }
    }

    pub(crate) fn resolve_string(&self, id: KeyId) -> String {
        self.interner
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// Per-series summaries sorted by metric name, then tags.
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let mut out = Vec::new();

        for (metric_id, name, kind) in self.metrics() {
            self.visit_series(metric_id, |tags, storage| {
                let tag_vec: Vec<(String, String)> = tags
                    .iter()
                    .map(|(k, v)| (self.resolve_string(k), self.resolve_string(v)))
                    .collect();

                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind,
                    tags: tag_vec,
                    values: storage.value(),
                });
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}
