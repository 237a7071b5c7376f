use hlsgrab_engine::{TaskEvent, TaskStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments ({percent}%)")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Renders one task's events as a segment progress bar.
pub struct ProgressManager {
    bar: Option<ProgressBar>,
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(segment_style());
        bar.set_message("Loading playlist");
        bar.enable_steady_tick(Duration::from_millis(200));
        Self { bar: Some(bar) }
    }

    pub fn new_disabled() -> Self {
        Self { bar: None }
    }

    pub fn handle_event(&self, event: &TaskEvent) {
        let Some(bar) = &self.bar else {
            return;
        };

        match event {
            TaskEvent::Progress {
                downloaded, total, ..
            } => {
                bar.set_length(*total as u64);
                bar.set_position(*downloaded as u64);
            }
            TaskEvent::Status {
                status, message, ..
            } => {
                let message = message.clone().unwrap_or_else(|| status.to_string());
                match status {
                    TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled => {
                        bar.finish_with_message(message)
                    }
                    _ => bar.set_message(message),
                }
            }
            TaskEvent::Conversion { message, .. } => {
                if let Some(message) = message {
                    bar.println(message);
                }
            }
        }
    }

    /// Print a line above the bar. No-op when disabled.
    pub fn println(&self, line: &str) {
        if let Some(bar) = &self.bar {
            bar.println(line);
        }
    }
}
