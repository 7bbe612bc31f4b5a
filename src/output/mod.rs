mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::WaitSpinner;
pub use summary::{print_wait_summary, render_wait_summary};

use styling::{dim, magenta_bold};

/// Prints the `gitlab-context` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔍 gitlab-context"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab Context Tool")
    );
}
