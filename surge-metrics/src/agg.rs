//! Ratios derived from raw counter reads.

/// Events per second over `dt_secs`; a zero interval is treated as one nanosecond.
#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    delta as f64 / dt_secs.max(1e-9)
}

/// `hits / total`, undefined when nothing was recorded.
pub fn rate_of(hits: u64, total: u64) -> Option<f64> {
    // Live reads are not atomic across both counters.
    (total > 0).then(|| hits.min(total) as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_sec_clamps_zero_interval() {
        assert!((per_sec(3, 1.0) - 3.0).abs() < 1e-9);
        assert!((per_sec(30, 0.5) - 60.0).abs() < 1e-9);
        assert!(per_sec(7, 0.0).is_finite());
    }

    #[test]
    fn rate_is_undefined_without_samples() {
        assert_eq!(rate_of(0, 0), None);
        assert_eq!(rate_of(1, 4), Some(0.25));
        assert_eq!(rate_of(5, 4), Some(1.0));
    }
}
