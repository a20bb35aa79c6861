//! Byte-based progress bars over compressed input, one per archive file.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn byte_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
         {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
}

/// Progress over one file's compressed bytes, possibly walked more than once
/// (two-pass schema discovery). Hidden when progress is disabled.
pub struct FileProgress {
    pb: ProgressBar,
    file_bytes: u64,
    pass_offset: u64,
}

impl FileProgress {
    pub fn new(enabled: bool, file_bytes: u64, passes: u64, label: &str) -> Self {
        let pb = if enabled {
            let pb = ProgressBar::new(file_bytes.saturating_mul(passes.max(1)));
            pb.set_style(byte_style());
            pb.set_message(label.to_string());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };
        Self { pb, file_bytes, pass_offset: 0 }
    }

    /// Report the bytes consumed in the current pass.
    #[inline]
    pub fn set_consumed(&self, consumed: u64) {
        self.pb.set_position(self.pass_offset + consumed.min(self.file_bytes));
    }

    /// Move on to the next pass over the same file.
    pub fn next_pass(&mut self, label: &str) {
        self.pass_offset += self.file_bytes;
        self.pb.set_position(self.pass_offset);
        self.pb.set_message(label.to_string());
    }

    pub fn finish(&self, msg: impl Into<String>) {
        self.pb.finish_with_message(msg.into());
    }
}
