use surge_core::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// At least one request failed (zero-downtime not achieved).
    ErrorsDetected = 10,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// Errors detected and thresholds failed.
    ErrorsAndThresholdsFailed = 12,

    /// Invalid CLI/plan input (bad flags, unreadable plan, invalid thresholds, missing target).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, task failures).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_verdict(verdict: Verdict) -> Self {
        match (!verdict.zero_errors, !verdict.thresholds_passed) {
            (false, false) => Self::Success,
            (true, false) => Self::ErrorsDetected,
            (false, true) => Self::ThresholdsFailed,
            (true, true) => Self::ErrorsAndThresholdsFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(thresholds_passed: bool, zero_errors: bool) -> Verdict {
        Verdict {
            thresholds_passed,
            zero_errors,
        }
    }

    #[test]
    fn verdict_maps_to_exit_code() {
        assert_eq!(ExitCode::from_verdict(verdict(true, true)).as_i32(), 0);
        assert_eq!(ExitCode::from_verdict(verdict(true, false)).as_i32(), 10);
        assert_eq!(ExitCode::from_verdict(verdict(false, true)).as_i32(), 11);
        assert_eq!(ExitCode::from_verdict(verdict(false, false)).as_i32(), 12);
    }
}
