use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agg::rate_of;
use crate::key::{Interner, KeyId};
use crate::metrics::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage, TrendCell,
};
use crate::tags::TagSet;
use std::sync::atomic::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

type SeriesMap = DashMap<TagSet, MetricStorage>;

/// Shared, concurrently writable store of named, tagged metric series.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, Arc<SeriesMap>>,
}

impl Registry {
    /// Registers `name`, or returns the existing id. The first registration fixes the kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricId {
        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some(idx) = defs.iter().position(|d| d.name == name_id) {
            return MetricId(idx as u32);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, Arc::new(DashMap::new()));
        id
    }

    pub fn lookup_metric(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.lookup(name)?;
        let defs = self.defs.read();
        defs.iter()
            .position(|d| d.name == name_id)
            .map(|idx| (MetricId(idx as u32), defs[idx].kind))
    }

    pub fn metric_kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        let mut resolved: Vec<(KeyId, KeyId)> = tags
            .iter()
            .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v)))
            .collect();
        resolved.sort_unstable();
        resolved.dedup_by_key(|(k, _)| *k);
        TagSet::from_sorted_iter(resolved)
    }

    fn series(&self, metric: MetricId) -> Option<Arc<SeriesMap>> {
        self.storage.get(&metric).map(|s| s.value().clone())
    }

    pub fn get_handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        let series = self.series(metric)?;

        if let Some(storage) = series.get(&tags) {
            return Some(storage.handle());
        }

        let kind = self.metric_kind(metric)?;
        let entry = series
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind));
        Some(entry.handle())
    }

    fn visit_series(
        &self,
        metric: MetricId,
        mut f: impl FnMut(&TagSet, &MetricStorage),
    ) {
        let Some(series) = self.series(metric) else {
            return;
        };
        for entry in series.iter() {
            f(entry.key(), entry.value());
        }
    }

    pub fn count_series(&self, metric: MetricId, filter: impl Fn(&TagSet) -> bool) -> usize {
        let mut n = 0usize;
        self.visit_series(metric, |tags, _| {
            if filter(tags) {
                n += 1;
            }
        });
        n
    }

    pub fn fold_counter_sum(&self, metric: MetricId, filter: impl Fn(&TagSet) -> bool) -> u64 {
        let mut sum = 0u64;
        self.visit_series(metric, |tags, storage| {
            if let MetricStorage::Counter(c) = storage
                && filter(tags)
            {
                sum = sum.saturating_add(c.load(Ordering::Relaxed));
            }
        });
        sum
    }

    /// `(total, hits, rate)` across matching series.
    pub fn fold_rate_sum(
        &self,
        metric: MetricId,
        filter: impl Fn(&TagSet) -> bool,
    ) -> (u64, u64, Option<f64>) {
        let mut total = 0u64;
        let mut hits = 0u64;
        self.visit_series(metric, |tags, storage| {
            if let MetricStorage::Rate(r) = storage
                && filter(tags)
            {
                total = total.saturating_add(r.total.load(Ordering::Relaxed));
                hits = hits.saturating_add(r.hits.load(Ordering::Relaxed));
            }
        });
        (total, hits, rate_of(hits, total))
    }

    /// Merged trend across matching series; `None` when no series matched.
    pub fn fold_trend(&self, metric: MetricId, filter: impl Fn(&TagSet) -> bool) -> Option<TrendCell> {
        let mut acc: Option<TrendCell> = None;
        self.visit_series(metric, |tags, storage| {
            if let MetricStorage::Trend(t) = storage
                && filter(tags)
            {
                acc.get_or_insert_with(TrendCell::new).merge(&t.lock());
            }
        });
        acc
    }

    /// Gauge values of matching series.
    pub fn fold_gauges(&self, metric: MetricId, filter: impl Fn(&TagSet) -> bool) -> Vec<i64> {
        let mut out = Vec::new();
        self.visit_series(metric, |tags, storage| {
            if let MetricStorage::Gauge(g) = storage
                && filter(tags)
            {
                out.push(g.load(Ordering::Relaxed));
            }
        });
        out
    }

    fn render_tags(&self, tags: &TagSet) -> Vec<(String, String)> {
        tags.iter()
            .map(|(k, v)| {
                (
                    self.interner
                        .resolve(k)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    self.interner
                        .resolve(v)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Snapshot of every series, ordered by metric name then tags.
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let defs: Vec<(MetricId, KeyId, MetricKind)> = self
            .defs
            .read()
            .iter()
            .enumerate()
            .map(|(idx, d)| (MetricId(idx as u32), d.name, d.kind))
            .collect();

        let mut out = Vec::new();
        for (id, name, kind) in defs {
            let name = self
                .interner
                .resolve(name)
                .map(|s| s.to_string())
                .unwrap_or_default();

            self.visit_series(id, |tags, storage| {
                let mut tags = self.render_tags(tags);
                tags.sort();
                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind,
                    tags,
                    values: storage.value(),
                });
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricValue;

    #[test]
    fn register_is_idempotent_and_lookup_finds_kind() {
        let reg = Registry::default();
        let a = reg.register("errors_502", MetricKind::Counter);
        let b = reg.register("errors_502", MetricKind::Counter);
        assert_eq!(a, b);
        assert_eq!(
            reg.lookup_metric("errors_502"),
            Some((a, MetricKind::Counter))
        );
        assert_eq!(reg.lookup_metric("errors_504"), None);
    }

    #[test]
    fn handles_for_same_tags_share_storage() {
        let reg = Registry::default();
        let id = reg.register("http_reqs", MetricKind::Counter);
        let tags = reg.resolve_tags(&[("scenario", "warmup")]);

        let a = reg.get_handle(id, tags.clone());
        let b = reg.get_handle(id, tags);
        let (Some(a), Some(b)) = (a, b) else {
            panic!("expected handles");
        };
        a.increment(2);
        b.increment(3);
        assert_eq!(reg.fold_counter_sum(id, |_| true), 5);
    }

    #[test]
    fn concurrent_writers_do_not_lose_increments() {
        let reg = Arc::new(Registry::default());
        let id = reg.register("http_reqs", MetricKind::Counter);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let tags = reg.resolve_tags(&[("scenario", "s")]);
                        if let Some(h) = reg.get_handle(id, tags) {
                            h.increment(1);
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            if t.join().is_err() {
                panic!("writer thread panicked");
            }
        }

        assert_eq!(reg.fold_counter_sum(id, |_| true), 8000);
    }

    #[test]
    fn fold_filters_by_tags() {
        let reg = Registry::default();
        let id = reg.register("error_rate", MetricKind::Rate);
        let warmup = reg.resolve_tags(&[("scenario", "warmup")]);
        let rolling = reg.resolve_tags(&[("scenario", "rolling_update")]);

        if let Some(h) = reg.get_handle(id, warmup.clone()) {
            h.add_rate(false);
            h.add_rate(false);
        }
        if let Some(h) = reg.get_handle(id, rolling) {
            h.add_rate(true);
            h.add_rate(false);
        }

        let (total, hits, rate) = reg.fold_rate_sum(id, |_| true);
        assert_eq!((total, hits), (4, 1));
        assert_eq!(rate, Some(0.25));

        let (total, hits, rate) = reg.fold_rate_sum(id, |t| t.contains_all(&warmup));
        assert_eq!((total, hits), (2, 0));
        assert_eq!(rate, Some(0.0));

        let cooldown = reg.resolve_tags(&[("scenario", "cooldown")]);
        assert_eq!(reg.count_series(id, |t| t.contains_all(&cooldown)), 0);
        assert_eq!(reg.count_series(id, |_| true), 2);
    }

    #[test]
    fn summarize_is_sorted_and_resolves_tags() {
        let reg = Registry::default();
        let trend = reg.register("http_req_duration", MetricKind::Trend);
        let counter = reg.register("errors_502", MetricKind::Counter);

        if let Some(h) = reg.get_handle(trend, reg.resolve_tags(&[("scenario", "b")])) {
            h.observe(12.5);
        }
        if let Some(h) = reg.get_handle(trend, reg.resolve_tags(&[("scenario", "a")])) {
            h.observe(1.0);
        }
        if let Some(h) = reg.get_handle(counter, TagSet::default()) {
            h.increment(7);
        }

        let s = reg.summarize();
        assert_eq!(s.len(), 3);
        assert_eq!(s[0].name, "errors_502");
        assert!(matches!(s[0].values, MetricValue::Counter(7)));
        assert_eq!(s[1].tags, vec![("scenario".to_string(), "a".to_string())]);
        assert_eq!(s[2].tags, vec![("scenario".to_string(), "b".to_string())]);
    }
}
