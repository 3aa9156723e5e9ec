//! Spinner status line and summary reporting for CLI downloads.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::{SessionStats, StatusSink, format_bytes, format_duration};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Renders the batch status line through an `indicatif` spinner.
pub struct SpinnerStatus {
    bar: ProgressBar,
}

impl SpinnerStatus {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(250));
        Self { bar }
    }

    /// Removes the spinner from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StatusSink for SpinnerStatus {
    fn render(&self, line: &str, _plain: &str) {
        self.bar.set_message(line.to_string());
    }

    fn message(&self, text: &str) {
        self.bar.println(format!("  {text}"));
    }
}

/// Prints a summary of download statistics.
pub fn print_summary(stats: &SessionStats) {
    if stats.batches_completed == 0 && stats.batches_failed == 0 {
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");

    println!("  Videos joined:     {}", stats.batches_completed);
    if stats.segments_downloaded > 0 {
        println!("  Segments fetched:  {}", stats.segments_downloaded);
        println!("  Total size:        {}", format_bytes(stats.bytes_downloaded));
        println!("  Total time:        {}", format_duration(stats.elapsed));
        println!(
            "  Average speed:     {}/s",
            format_bytes(stats.average_speed())
        );
        println!("  Peak speed:        {}/s", format_bytes(stats.peak_speed));
    }
    if stats.segments_cached > 0 {
        println!("  Segments reused:   {}", stats.segments_cached);
    }
    if stats.batches_failed > 0 {
        println!("  Failed:            {}", stats.batches_failed);
    }

    println!("{SEPARATOR}");
}
