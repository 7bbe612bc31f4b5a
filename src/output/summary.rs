use std::fmt::Write;

use crate::gitlab::wait::{FailedJobDetail, FinalStatus, PipelineWaitResult};
use comfy_table::{Cell, Color as TableColor};

use super::styling::{bright, bright_yellow, by_status, cyan, dim};
use super::tables::{color_coded_count_cell, create_table, final_status_cell};

/// Prints a human-readable summary of a finished pipeline wait to stdout.
///
/// Displays:
/// - Overview: final status, pipeline link, elapsed time and poll count
/// - Jobs: total/success/failed counts when the job list was available
/// - Failed Jobs: one row per enriched failed job with its log tail
/// - Next Steps: hints matching the final status
pub fn print_wait_summary(result: &PipelineWaitResult) {
    println!("{}", render_wait_summary(result));
}

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        format!("{:.1}min", seconds / 60.0)
    }
}

fn job_location(job: &FailedJobDetail) -> &str {
    job.web_url.as_deref().unwrap_or(&job.full_log)
}

pub fn render_wait_summary(result: &PipelineWaitResult) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Pipeline");

    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Pipeline:"),
        cyan(
            result
                .pipeline_url
                .clone()
                .unwrap_or_else(|| format!("#{}", result.pipeline_id))
        ),
        dim("Final status:"),
        by_status(result.final_status, result.final_status),
        dim("Waited:"),
        bright_yellow(format_duration(result.duration_seconds)),
        dim("Checks performed:"),
        bright_yellow(result.checks_performed),
    );

    if let Some(summary) = &result.job_summary {
        add_section_header(&mut output, "⚙️", "Jobs");

        let mut jobs_table = create_table();
        jobs_table.set_header(create_cyan_header(&["Status", "Total", "Success", "Failed"]));
        jobs_table.add_row(vec![
            final_status_cell(result.final_status),
            Cell::new(summary.total),
            color_coded_count_cell(summary.success, TableColor::Green),
            color_coded_count_cell(summary.failed, TableColor::Red),
        ]);

        let _ = writeln!(output, "{jobs_table}\n");
    }

    if let Some(failed_jobs) = result.failed_jobs.as_ref().filter(|jobs| !jobs.is_empty()) {
        add_section_header(&mut output, "❌", "Failed Jobs");

        let mut failed_table = create_table();
        failed_table.set_header(create_cyan_header(&["Job", "Stage", "Last Log Lines", "Link"]));

        for job in failed_jobs {
            failed_table.add_row(vec![
                Cell::new(format!("{}\n#{}", job.name, job.id)).fg(TableColor::Red),
                Cell::new(job.stage.as_deref().unwrap_or("-")),
                Cell::new(&job.last_log_lines),
                Cell::new(job_location(job)),
            ]);
        }

        let _ = writeln!(output, "{failed_table}\n");
    }

    add_section_header(&mut output, "💡", "Next Steps");
    let hint = match result.final_status {
        FinalStatus::Success => "Pipeline passed - nothing to do",
        FinalStatus::Failed => "Inspect the failed job logs above and push a fix",
        FinalStatus::Canceled => "Pipeline was canceled - retry it if that was unintended",
        FinalStatus::Skipped => "Pipeline was skipped - check rules and workflow settings",
        FinalStatus::Timeout => "Pipeline still running - wait again with a larger --timeout",
    };
    let _ = writeln!(output, "  {} {hint}", cyan("•"));

    output
}
