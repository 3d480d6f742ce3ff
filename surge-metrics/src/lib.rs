pub mod agg;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod tags;

pub use key::KeyId;
pub use metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricValue, TrendCell, TrendSummary};
pub use registry::{MetricId, Registry};
pub use tags::TagSet;
