//! High-water mark of budget usage.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_bytes: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the high-water mark to `used_bytes` if it is higher.
    pub fn record_used(&self, used_bytes: usize) {
        let previous = self.peak_bytes.fetch_max(used_bytes, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        if used_bytes > previous {
            tracing::trace!(peak = used_bytes, "new memory peak");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = previous;
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_only_grows() {
        let t = PeakTracker::new();
        t.record_used(10);
        t.record_used(4);
        assert_eq!(t.peak(), 10);
        t.record_used(12);
        assert_eq!(t.peak(), 12);
    }
}
