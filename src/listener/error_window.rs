use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Sliding-window counter for socket errors
///
/// Trips once more than `threshold` errors land inside `window`. Old
/// entries are pruned on every record, so memory stays bounded by the
/// error rate.
#[derive(Debug)]
pub struct ErrorTracker {
    window: Duration,
    threshold: usize,
    events: VecDeque<Instant>,
}

impl ErrorTracker {
    /// Create a tracker over `window` with the given trip threshold
    #[must_use]
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            events: VecDeque::new(),
        }
    }

    /// Record an error at the current instant
    ///
    /// Returns `true` when the count inside the window now exceeds the
    /// threshold.
    pub fn record(&mut self) -> bool {
        let now = Instant::now();
        self.events.push_back(now);
        while self
            .events
            .front()
            .is_some_and(|first| now.duration_since(*first) > self.window)
        {
            self.events.pop_front();
        }
        self.events.len() > self.threshold
    }

    /// Forget all recorded errors
    pub fn reset(&mut self) {
        self.events.clear();
    }
}
