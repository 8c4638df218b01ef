//! Rate limiting for per-frame diagnostics.

/// Default number of failures between two logged diagnostics.
pub const DEFAULT_DIAGNOSTIC_INTERVAL: u64 = 300;

/// Decides which occurrences of a repeating failure get logged.
///
/// The first occurrence is logged, then one in every `interval`. With an
/// interval of 300, a run of 300 consecutive failures produces one line.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    interval: u64,
    occurrences: u64,
}

impl LogThrottle {
    /// Throttle logging once per `interval` occurrences. Zero is treated as one.
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            occurrences: 0,
        }
    }

    /// Record an occurrence. Returns true if this one should be logged.
    pub fn hit(&mut self) -> bool {
        let log = self.occurrences.is_multiple_of(self.interval);
        self.occurrences = self.occurrences.wrapping_add(1);
        log
    }

    /// Occurrences recorded so far.
    pub fn occurrences(&self) -> u64 {
        self.occurrences
    }

    /// Configured interval.
    pub fn interval(&self) -> u64 {
        self.interval
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTIC_INTERVAL)
    }
}
