use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner counting files as the walker accepts them
pub fn create_scan_spinner(root: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg} {pos} files")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(format!("Scanning {}", root));
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Hidden bar for quiet runs; `inc` is a no-op on the terminal
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}

/// Finish and clear progress bar
pub fn finish_and_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bar_counts() {
        let pb = hidden();
        pb.inc(3);
        assert_eq!(pb.position(), 3);
        finish_and_clear(&pb);
        assert!(pb.is_finished());
    }
}
