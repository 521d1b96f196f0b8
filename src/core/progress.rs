//! Progress reporting utilities using indicatif.
//!
//! Each pipeline stage gets a spinner or a bar on stderr. Nothing is drawn
//! when stderr is not a terminal.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Style templates for pipeline stages.
pub mod styles {
    use super::*;

    /// Bar style for stages with a known amount of work.
    pub fn stage() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.green/white}] {pos}/{len} {msg}")
            .expect("valid template")
            .progress_chars("=>-")
    }

    /// Spinner style for stages waiting on a collaborator.
    pub fn spinner() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.dim} {msg}")
            .expect("valid template")
    }
}

/// Check if stderr is a TTY (for deciding whether to show progress bars).
pub fn is_tty() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}

/// Create a stage bar for `total` items.
pub fn create_progress(total: usize, stage: &str) -> ProgressBar {
    let bar = if is_tty() {
        ProgressBar::new(total as u64)
    } else {
        ProgressBar::hidden()
    };
    bar.set_length(total as u64);
    bar.set_style(styles::stage());
    bar.set_prefix(stage.to_string());
    bar
}

/// Create a spinner for a stage of unknown length.
pub fn create_spinner(stage: &str, message: &str) -> ProgressBar {
    if is_tty() {
        let bar = ProgressBar::new_spinner();
        bar.set_style(styles::spinner());
        bar.set_prefix(stage.to_string());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    }
}
