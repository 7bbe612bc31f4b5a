use super::refs::ProjectId;

/// Builds a clickable pipeline URL.
///
/// Web URLs need the project path, so a numeric project id yields `None`.
///
/// # Arguments
///
/// * `base_url` - GitLab instance base URL (e.g., <https://gitlab.com>)
/// * `project` - Project the pipeline belongs to
/// * `pipeline_id` - Numeric pipeline id
///
/// # Returns
///
/// URL like <https://gitlab.com/group/project/-/pipelines/123>
pub fn pipeline_url(base_url: &str, project: &ProjectId, pipeline_id: u64) -> Option<String> {
    web_path(base_url, project).map(|path| format!("{path}/-/pipelines/{pipeline_id}"))
}

/// Builds a clickable job URL, like [`pipeline_url`] does for pipelines.
pub fn job_url(base_url: &str, project: &ProjectId, job_id: u64) -> Option<String> {
    web_path(base_url, project).map(|path| format!("{path}/-/jobs/{job_id}"))
}

/// Resource URI pointing at the full log of a job.
pub fn job_log_uri(project: &ProjectId, job_id: u64) -> String {
    format!("gitlab://projects/{}/jobs/{job_id}/log", project.url_segment())
}

fn web_path(base_url: &str, project: &ProjectId) -> Option<String> {
    match project {
        ProjectId::Path(path) => Some(format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )),
        ProjectId::Id(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_url() {
        let project = ProjectId::Path("group/project".to_string());
        assert_eq!(
            pipeline_url("https://gitlab.com", &project, 123456).as_deref(),
            Some("https://gitlab.com/group/project/-/pipelines/123456")
        );
    }

    #[test]
    fn test_job_url_trims_slashes() {
        let project = ProjectId::Path("group/project".to_string());
        assert_eq!(
            job_url("https://gitlab.com/", &project, 789012).as_deref(),
            Some("https://gitlab.com/group/project/-/jobs/789012")
        );
    }

    #[test]
    fn test_numeric_project_has_no_web_url() {
        assert_eq!(pipeline_url("https://gitlab.com", &ProjectId::Id(5), 1), None);
        assert_eq!(job_url("https://gitlab.com", &ProjectId::Id(5), 1), None);
    }

    #[test]
    fn test_job_log_uri() {
        assert_eq!(
            job_log_uri(&ProjectId::Id(5), 42),
            "gitlab://projects/5/jobs/42/log"
        );
        assert_eq!(
            job_log_uri(&ProjectId::Path("a/b".to_string()), 42),
            "gitlab://projects/a%2Fb/jobs/42/log"
        );
    }
}
