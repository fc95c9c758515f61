//! Load-progress reporting.

/// A passive sink told how many archive bytes the cursor has consumed.
///
/// Called after each header read, each payload materialization and each
/// skip. Only bytes of the archive itself are reported: reads from an inflated
/// record payload were already counted when the compressed bytes were taken.
pub trait ProgressObserver {
    fn on_bytes_consumed(&mut self, count: usize);
}

impl<F: FnMut(usize)> ProgressObserver for F {
    #[inline]
    fn on_bytes_consumed(&mut self, count: usize) {
        self(count)
    }
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    #[inline]
    fn on_bytes_consumed(&mut self, _count: usize) {}
}
