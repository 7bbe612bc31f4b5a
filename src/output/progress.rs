use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_red, bright_yellow, by_status};
use crate::gitlab::wait::FinalStatus;

/// Spinner shown on stderr while a pipeline wait is in progress
pub struct WaitSpinner {
    pb: ProgressBar,
}

impl WaitSpinner {
    pub fn start(pipeline_id: u64) -> Self {
        eprintln!("{}  {}", bright("⏳"), bright("Waiting").underlined());
        let pb = create_spinner(
            bright_yellow(format!("Waiting for pipeline {pipeline_id}")).to_string(),
        );
        Self { pb }
    }

    pub fn finish(self, status: FinalStatus) {
        let mark = match status {
            FinalStatus::Success => " ✓",
            FinalStatus::Failed => " ✗",
            _ => "",
        };
        self.pb.finish_with_message(
            by_status(status, format!("Pipeline finished: {status}{mark}")).to_string(),
        );
        eprintln!();
    }

    pub fn abandon(self) {
        self.pb
            .abandon_with_message(bright_red("Wait interrupted").to_string());
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner} {elapsed}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
