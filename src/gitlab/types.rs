use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The subset of a GitLab project the resolver cares about.
///
/// Always fetched live; nothing here is persisted between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    /// Numeric project ID
    pub id: u64,
    /// Full path (e.g., "group/subgroup/project")
    pub path_with_namespace: String,
    /// Project page URL
    pub web_url: String,
    /// Default branch, absent for empty repositories
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// A merge request as returned by the list and detail endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Global ID
    pub id: u64,
    /// Project-scoped IID (the `!42` number)
    pub iid: u64,
    pub title: String,
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Aggregate status of a pipeline as reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
    /// Anything newer than this client knows about
    #[serde(other)]
    Unknown,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Canceled | Self::Skipped
        )
    }
}

/// A CI pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub status: PipelineStatus,
    /// Branch or tag the pipeline ran for
    #[serde(rename = "ref", default)]
    pub ref_: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A job within a pipeline.
///
/// Job status is kept as the raw upstream string: only `success` and
/// `failed` are interpreted, everything else is counted in the total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub stage: Option<String>,
    pub status: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

impl Job {
    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Response of `GET /version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub revision: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_status_deserialization() {
        let pipeline: Pipeline = serde_json::from_str(
            r#"{"id": 7, "status": "waiting_for_resource", "ref": "main", "web_url": "https://gitlab.com/g/p/-/pipelines/7"}"#,
        )
        .unwrap();
        assert_eq!(pipeline.status, PipelineStatus::WaitingForResource);
        assert_eq!(pipeline.ref_.as_deref(), Some("main"));
        assert!(!pipeline.status.is_terminal());
    }

    #[test]
    fn test_unknown_pipeline_status_is_not_terminal() {
        let pipeline: Pipeline =
            serde_json::from_str(r#"{"id": 7, "status": "brand_new_state"}"#).unwrap();
        assert_eq!(pipeline.status, PipelineStatus::Unknown);
        assert!(!pipeline.status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [
            PipelineStatus::Success,
            PipelineStatus::Failed,
            PipelineStatus::Canceled,
            PipelineStatus::Skipped,
        ] {
            assert!(status.is_terminal(), "{status:?} should be terminal");
        }
        assert!(!PipelineStatus::Manual.is_terminal());
        assert!(!PipelineStatus::Running.is_terminal());
    }

    #[test]
    fn test_project_snapshot_ignores_extra_fields() {
        let project: ProjectSnapshot = serde_json::from_str(
            r#"{"id": 1, "name": "app", "path_with_namespace": "group/app",
                "web_url": "https://gitlab.com/group/app", "default_branch": null,
                "star_count": 3}"#,
        )
        .unwrap();
        assert_eq!(project.id, 1);
        assert_eq!(project.default_branch, None);
    }
}
