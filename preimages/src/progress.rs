use indicatif::{ProgressBar, ProgressStyle};

/// Progress sink the extraction driver reports into.
pub trait Progress {
    fn range_started(&mut self, from: u64, to: u64);
    fn block_scanned(&mut self, height: u64, keys: u64);
}

/// Sink that swallows all progress, for callers that do their own
/// reporting.
pub struct NoProgress;

impl Progress for NoProgress {
    fn range_started(&mut self, _from: u64, _to: u64) {}
    fn block_scanned(&mut self, _height: u64, _keys: u64) {}
}

pub struct BlockProgressBar {
    inner: ProgressBar,
}

impl BlockProgressBar {
    pub fn new() -> Self {
        let inner = ProgressBar::new(0);
        inner.set_style(
            ProgressStyle::with_template("{bar:50.cyan/blue} {pos}/{len} blocks [eta: {eta}] {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Self { inner }
    }

    pub fn finish(self) {
        self.inner.finish();
    }
}

impl Progress for BlockProgressBar {
    fn range_started(&mut self, from: u64, to: u64) {
        self.inner.set_length(to - from + 1);
        self.inner.set_position(0);
    }

    fn block_scanned(&mut self, height: u64, keys: u64) {
        self.inner.inc(1);
        self.inner.set_message(format!("block {height} (+{keys} keys)"));
    }
}
