//! Sliding time window over probe outcomes with amortized counting.

/// Once this many leading samples have expired the buffer is compacted.
pub const GC_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp_ms: u64,
    /// `true` when the probe reported a change.
    pub outcome: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CountCache {
    window_start_index: usize,
    window_end_index: usize,
    true_count: usize,
}

impl CountCache {
    fn midpoint(&self) -> usize {
        self.window_start_index + (self.window_end_index - self.window_start_index) / 2
    }
}

/// Outcome tally over the trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCount {
    pub changed: usize,
    pub total: usize,
}

impl WindowCount {
    /// Share of samples that reported a change; zero for an empty window.
    pub fn proportion(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.changed as f64 / self.total as f64
    }
}

/// Append-only sample log. `valid_index` marks the first sample still inside
/// the window and only moves forward until the buffer is compacted.
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    samples: Vec<Sample>,
    valid_index: usize,
    cache: Option<CountCache>,
}

impl SampleWindow {
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.valid_index = 0;
        self.cache = None;
    }

    /// Samples physically held, expired ones included.
    pub fn buffered(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Counts samples with `timestamp_ms > now_ms - span_ms`. Before `span_ms`
    /// has elapsed every sample is in the window.
    pub fn count(&mut self, now_ms: u64, span_ms: u64) -> WindowCount {
        if let Some(window_start) = now_ms.checked_sub(span_ms) {
            while self
                .samples
                .get(self.valid_index)
                .is_some_and(|sample| sample.timestamp_ms <= window_start)
            {
                self.valid_index += 1;
            }
        }

        if let Some(cache) = &mut self.cache {
            if self.valid_index > cache.midpoint() {
                self.cache = None;
            } else if self.valid_index > cache.window_start_index {
                let expired = self.samples[cache.window_start_index..self.valid_index]
                    .iter()
                    .filter(|sample| sample.outcome)
                    .count();
                cache.true_count -= expired;
                cache.window_start_index = self.valid_index;
            }
        }

        let mut cache = self.cache.unwrap_or(CountCache {
            window_start_index: self.valid_index,
            window_end_index: self.valid_index,
            true_count: 0,
        });
        cache.true_count += self.samples[cache.window_end_index..]
            .iter()
            .filter(|sample| sample.outcome)
            .count();
        cache.window_end_index = self.samples.len();

        let count = WindowCount {
            changed: cache.true_count,
            total: self.samples.len() - self.valid_index,
        };

        if self.valid_index >= GC_THRESHOLD {
            self.samples.drain(..self.valid_index);
            cache.window_start_index -= self.valid_index;
            cache.window_end_index -= self.valid_index;
            self.valid_index = 0;
        }
        self.cache = Some(cache);

        count
    }
}

#[cfg(test)]
mod tests {
    use super::GC_THRESHOLD;
    use super::Sample;
    use super::SampleWindow;
    use super::WindowCount;
    use proptest::prelude::*;

    fn brute_force(history: &[Sample], now_ms: u64, span_ms: u64) -> WindowCount {
        let in_window = history.iter().filter(|sample| match now_ms.checked_sub(span_ms) {
            Some(start) => sample.timestamp_ms > start,
            None => true,
        });
        let mut count = WindowCount::default();
        for sample in in_window {
            count.total += 1;
            count.changed += usize::from(sample.outcome);
        }
        count
    }

    #[test]
    fn empty_window_has_zero_proportion() {
        let mut window = SampleWindow::default();
        let count = window.count(1_000, 240);
        assert_eq!(count, WindowCount::default());
        assert_eq!(count.proportion(), 0.0);
    }

    #[test]
    fn expires_samples_at_window_boundary() {
        let mut window = SampleWindow::default();
        for (timestamp_ms, outcome) in [(0, true), (100, true), (200, false), (300, true)] {
            window.push(Sample {
                timestamp_ms,
                outcome,
            });
        }
        // Window is (60, 300]: the sample at 0 is gone.
        assert_eq!(window.count(300, 240), WindowCount { changed: 2, total: 3 });
        // Window is (100, 340]: the sample at exactly 100 is gone too.
        assert_eq!(window.count(340, 240), WindowCount { changed: 1, total: 2 });
    }

    #[test]
    fn compacts_buffer_after_threshold() {
        let mut window = SampleWindow::default();
        let mut history = Vec::new();
        for step in 0..(GC_THRESHOLD as u64 * 3) {
            let sample = Sample {
                timestamp_ms: step * 10,
                outcome: step % 3 == 0,
            };
            window.push(sample);
            history.push(sample);
            let now = step * 10;
            assert_eq!(window.count(now, 240), brute_force(&history, now, 240));
        }
        assert!(window.buffered() < GC_THRESHOLD + 30);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut window = SampleWindow::default();
        window.push(Sample {
            timestamp_ms: 5,
            outcome: true,
        });
        window.count(5, 240);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.count(5, 240), WindowCount::default());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

        #[test]
        fn matches_brute_force_recount(
            steps in prop::collection::vec((0u64..40, any::<bool>(), any::<bool>()), 1100..2500),
            span_ms in 1u64..400,
        ) {
            let mut window = SampleWindow::default();
            let mut history = Vec::new();
            let mut now = 0u64;

            for (gap, outcome, query) in steps {
                now += gap;
                let sample = Sample { timestamp_ms: now, outcome };
                window.push(sample);
                history.push(sample);
                if query {
                    prop_assert_eq!(window.count(now, span_ms), brute_force(&history, now, span_ms));
                }
            }

            prop_assert_eq!(window.count(now, span_ms), brute_force(&history, now, span_ms));
        }
    }
}
