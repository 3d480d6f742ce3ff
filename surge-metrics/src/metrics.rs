use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::agg::rate_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
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

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Trend(TrendSummary),
}

/// Trend statistics in the unit the samples were recorded in (milliseconds for latency).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

// Samples are stored at microsecond resolution; upper bound is one hour.
const TREND_SCALE: f64 = 1000.0;
const TREND_MAX_SCALED: u64 = 3_600_000_000;

/// Trend storage: exact count/sum/min/max plus an HDR histogram for percentiles.
#[derive(Debug, Clone)]
pub struct TrendCell {
    hist: Histogram<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for TrendCell {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendCell {
    pub fn new() -> Self {
        let hist = match Histogram::<u64>::new_with_bounds(1, TREND_MAX_SCALED, 3) {
            Ok(h) => h,
            Err(err) => panic!("failed to create histogram: {err}"),
        };
        Self {
            hist,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn observe(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let value = value.max(0.0);
        let scaled = (value * TREND_SCALE).round().clamp(1.0, TREND_MAX_SCALED as f64) as u64;
        self.hist.saturating_record(scaled);
        self.count = self.count.saturating_add(1);
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(&mut self, other: &TrendCell) {
        if other.count == 0 {
            return;
        }
        let _ = self.hist.add(&other.hist);
        self.count = self.count.saturating_add(other.count);
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Percentile in `0.0..=100.0`, clamped into the observed `[min, max]`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let q = (p / 100.0).clamp(0.0, 1.0);
        let v = self.hist.value_at_quantile(q) as f64 / TREND_SCALE;
        Some(v.clamp(self.min, self.max))
    }

    pub fn summary(&self) -> TrendSummary {
        if self.count == 0 {
            return TrendSummary::default();
        }
        TrendSummary {
            count: self.count,
            mean: Some(self.sum / self.count as f64),
            min: Some(self.min),
            max: Some(self.max),
            med: self.percentile(50.0),
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
            p99: self.percentile(99.0),
        }
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<TrendCell>>),
}

#[derive(Debug, Default)]
pub struct Rate {
    pub total: AtomicU64,
    pub hits: AtomicU64,
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricStorage::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => MetricStorage::Gauge(Arc::new(AtomicI64::new(0))),
            MetricKind::Rate => MetricStorage::Rate(Arc::new(Rate::default())),
            MetricKind::Trend => MetricStorage::Trend(Arc::new(Mutex::new(TrendCell::new()))),
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
            MetricStorage::Gauge(a) => MetricValue::Gauge(a.load(Ordering::Relaxed)),
            MetricStorage::Rate(r) => {
                let total = r.total.load(Ordering::Relaxed);
                let hits = r.hits.load(Ordering::Relaxed);
                MetricValue::Rate {
                    total,
                    hits,
                    rate: rate_of(hits, total),
                }
            }
            MetricStorage::Trend(t) => MetricValue::Trend(t.lock().summary()),
        }
    }
}

/// Write handle for one series. Cloning is cheap.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<TrendCell>>),
}

impl MetricHandle {
    #[inline]
    pub fn increment(&self, value: u64) {
        if let MetricHandle::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.store(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn max_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.fetch_max(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_rate(&self, hit: bool) {
        if let MetricHandle::Rate(r) = self {
            r.total.fetch_add(1, Ordering::Relaxed);
            if hit {
                r.hits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    pub fn observe(&self, value: f64) {
        if let MetricHandle::Trend(t) = self {
            t.lock().observe(value);
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
            g.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// `(total, hits)`.
    pub fn get_rate(&self) -> (u64, u64) {
        if let MetricHandle::Rate(r) = self {
            (
                r.total.load(Ordering::Relaxed),
                r.hits.load(Ordering::Relaxed),
            )
        } else {
            (0, 0)
        }
    }
}
