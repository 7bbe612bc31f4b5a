//! Blocking wait for a pipeline to reach a terminal state.
//!
//! The pipeline is polled every `check_interval` until GitLab reports
//! success, failed, canceled or skipped, or until `timeout` elapses. The
//! timeout is only checked between polls, so the reported duration can
//! overshoot it by up to one interval. Once finished, the result is enriched
//! with a job summary and, for failed pipelines, the tail of up to five
//! failed job logs.

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::client::GitLabClient;
use super::links;
use super::refs::ProjectId;
use super::types::{Job, Pipeline, PipelineStatus};
use crate::error::{GitLabError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

const MAX_FAILED_JOB_LOGS: usize = 5;
const LOG_TAIL_LINES: usize = 10;
const LOG_UNAVAILABLE: &str = "(log unavailable)";

/// How a wait ended. `Timeout` is decided locally, never by GitLab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Success,
    Failed,
    Canceled,
    Skipped,
    Timeout,
}

impl FinalStatus {
    fn from_upstream(status: PipelineStatus) -> Option<Self> {
        if !status.is_terminal() {
            return None;
        }
        Some(match status {
            PipelineStatus::Success => Self::Success,
            PipelineStatus::Failed => Self::Failed,
            PipelineStatus::Canceled => Self::Canceled,
            _ => Self::Skipped,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

impl JobSummary {
    fn from_jobs(jobs: &[Job]) -> Self {
        Self {
            total: jobs.len(),
            success: jobs.iter().filter(|j| j.is_success()).count(),
            failed: jobs.iter().filter(|j| j.is_failed()).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedJobDetail {
    pub id: u64,
    pub name: String,
    pub stage: Option<String>,
    pub status: String,
    pub web_url: Option<String>,
    /// Last non-empty log lines, or a placeholder when the log could not be fetched
    pub last_log_lines: String,
    /// Resource URI of the complete log
    pub full_log: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineWaitResult {
    pub final_status: FinalStatus,
    pub pipeline_id: u64,
    pub pipeline_url: Option<String>,
    pub duration_seconds: f64,
    pub checks_performed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_summary: Option<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_jobs: Option<Vec<FailedJobDetail>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub check_interval: Duration,
    /// Attach log tails of failed jobs when the pipeline fails
    pub include_failed_logs: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
            include_failed_logs: true,
        }
    }
}

/// Last `lines` non-empty lines of a job log.
pub fn log_tail(log: &str, lines: usize) -> String {
    let non_empty: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    non_empty[non_empty.len().saturating_sub(lines)..].join("\n")
}

pub struct PipelineWaiter<'a> {
    client: &'a GitLabClient,
    options: WaitOptions,
}

impl<'a> PipelineWaiter<'a> {
    pub fn new(client: &'a GitLabClient, options: WaitOptions) -> Self {
        Self { client, options }
    }

    /// Poll until the pipeline finishes, times out or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Any error fetching the pipeline status aborts the wait immediately.
    /// Cancellation returns [`GitLabError::Cancelled`]. Failures while
    /// enriching a finished pipeline are logged and never returned.
    pub async fn wait(
        &self,
        project: &ProjectId,
        pipeline_id: u64,
        cancel: &CancellationToken,
    ) -> Result<PipelineWaitResult> {
        info!(
            "Waiting for pipeline {pipeline_id} in project {project} (timeout: {}s, interval: {}s)",
            self.options.timeout.as_secs(),
            self.options.check_interval.as_secs()
        );

        let start = Instant::now();
        let (final_status, pipeline, checks) =
            self.poll(project, pipeline_id, start, cancel).await?;

        let mut result = PipelineWaitResult {
            final_status,
            pipeline_id,
            pipeline_url: pipeline.web_url.or_else(|| {
                links::pipeline_url(self.client.base_url(), project, pipeline_id)
            }),
            duration_seconds: round_seconds(start.elapsed()),
            checks_performed: checks,
            job_summary: None,
            failed_jobs: None,
        };

        if final_status != FinalStatus::Timeout {
            self.enrich(&mut result, project).await;
        }

        Ok(result)
    }

    async fn poll(
        &self,
        project: &ProjectId,
        pipeline_id: u64,
        start: Instant,
        cancel: &CancellationToken,
    ) -> Result<(FinalStatus, Pipeline, u32)> {
        let mut checks = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(GitLabError::Cancelled);
            }

            checks += 1;
            let elapsed = start.elapsed();

            let pipeline = self
                .client
                .pipeline(project, pipeline_id)
                .await
                .inspect_err(|e| warn!("Failed to check pipeline {pipeline_id}: {e}"))?;

            debug!(
                "Check #{checks}: Pipeline {pipeline_id} status = {:?} (elapsed: {:.1}s)",
                pipeline.status,
                elapsed.as_secs_f64()
            );

            if let Some(status) = FinalStatus::from_upstream(pipeline.status) {
                info!(
                    "Pipeline {pipeline_id} completed with status '{status}' after {:.1}s ({checks} checks)",
                    elapsed.as_secs_f64()
                );
                return Ok((status, pipeline, checks));
            }

            if elapsed > self.options.timeout {
                warn!(
                    "Pipeline {pipeline_id} timed out after {:.1}s (status was {:?})",
                    elapsed.as_secs_f64(),
                    pipeline.status
                );
                return Ok((FinalStatus::Timeout, pipeline, checks));
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Wait for pipeline {pipeline_id} cancelled after {checks} checks");
                    return Err(GitLabError::Cancelled);
                }
                _ = tokio::time::sleep(self.options.check_interval) => {}
            }
        }
    }

    async fn enrich(&self, result: &mut PipelineWaitResult, project: &ProjectId) {
        let jobs = match self.client.pipeline_jobs(project, result.pipeline_id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Could not fetch job details: {e}");
                return;
            }
        };

        result.job_summary = Some(JobSummary::from_jobs(&jobs));

        if self.options.include_failed_logs && result.final_status == FinalStatus::Failed {
            let details = jobs
                .iter()
                .filter(|j| j.is_failed())
                .take(MAX_FAILED_JOB_LOGS)
                .map(|job| self.failed_job_detail(project, job));
            result.failed_jobs = Some(join_all(details).await);
        }
    }

    async fn failed_job_detail(&self, project: &ProjectId, job: &Job) -> FailedJobDetail {
        let last_log_lines = match self.client.job_trace(project, job.id).await {
            Ok(log) => log_tail(&log, LOG_TAIL_LINES),
            Err(e) => {
                warn!("Could not fetch log for job {}: {e}", job.id);
                LOG_UNAVAILABLE.to_string()
            }
        };

        FailedJobDetail {
            id: job.id,
            name: job.name.clone(),
            stage: job.stage.clone(),
            status: job.status.clone(),
            web_url: job
                .web_url
                .clone()
                .or_else(|| links::job_url(self.client.base_url(), project, job.id)),
            last_log_lines,
            full_log: links::job_log_uri(project, job.id),
        }
    }
}

fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
