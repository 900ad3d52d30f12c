//! Progress reporting for long-running source builds

/// Receives build progress as a percentage, 0 through 100.
///
/// Reports are monotonically increasing and 100 arrives only once the build
/// has succeeded. Any `FnMut(u8)` closure is a sink.
pub trait ProgressSink {
    fn progress(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn progress(&mut self, percent: u8) {
        self(percent)
    }
}

/// Forwards only strictly increasing percentages to a sink
pub(crate) struct ProgressTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    last: Option<u8>,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: None }
    }

    /// Report `percent`, capped at 99 until [`finish`](Self::finish)
    pub(crate) fn report(&mut self, percent: u8) {
        self.emit(percent.min(99));
    }

    /// Report `done` of `total` steps mapped onto `[start, end]`
    pub(crate) fn report_fraction(&mut self, done: usize, total: usize, start: u8, end: u8) {
        let span = end.saturating_sub(start) as usize;
        let offset = if total == 0 { span } else { span * done.min(total) / total };
        self.report(start.saturating_add(offset as u8));
    }

    pub(crate) fn finish(&mut self) {
        self.emit(100);
    }

    fn emit(&mut self, percent: u8) {
        if self.last.is_none_or(|last| percent > last) {
            self.last = Some(percent);
            self.sink.progress(percent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_is_monotonic() {
        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        let mut tracker = ProgressTracker::new(&mut sink);

        tracker.report(0);
        tracker.report(10);
        tracker.report(5);
        tracker.report(10);
        tracker.report(100);
        tracker.finish();
        tracker.finish();

        assert_eq!(seen, vec![0, 10, 99, 100]);
    }

    #[test]
    fn test_report_fraction() {
        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        let mut tracker = ProgressTracker::new(&mut sink);

        for done in 0..=4 {
            tracker.report_fraction(done, 4, 10, 90);
        }
        tracker.report_fraction(0, 0, 90, 95);

        assert_eq!(seen, vec![10, 30, 50, 70, 90, 95]);
    }
}
