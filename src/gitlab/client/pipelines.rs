use super::core::{GitLabClient, PageRequest, PageResult, QueryParams};
use crate::error::Result;
use crate::gitlab::refs::ProjectId;
use crate::gitlab::types::{Job, Pipeline};

impl GitLabClient {
    /// Recent pipelines for a project, optionally filtered by branch or tag.
    pub async fn pipelines(
        &self,
        project: &ProjectId,
        ref_: Option<&str>,
        page: PageRequest,
    ) -> Result<PageResult<Pipeline>> {
        let mut params = QueryParams::new();
        if let Some(ref_) = ref_ {
            params.insert("ref".to_string(), ref_.to_string());
        }
        self.get_paginated(
            &format!("projects/{}/pipelines", project.url_segment()),
            &params,
            page,
        )
        .await
    }

    pub async fn pipeline(&self, project: &ProjectId, pipeline_id: u64) -> Result<Pipeline> {
        self.get(
            &format!("projects/{}/pipelines/{pipeline_id}", project.url_segment()),
            &QueryParams::new(),
        )
        .await
    }

    /// All jobs of a pipeline.
    pub async fn pipeline_jobs(&self, project: &ProjectId, pipeline_id: u64) -> Result<Vec<Job>> {
        let jobs = self
            .get_paginated(
                &format!(
                    "projects/{}/pipelines/{pipeline_id}/jobs",
                    project.url_segment()
                ),
                &QueryParams::new(),
                PageRequest::default(),
            )
            .await?;
        Ok(jobs.into_items())
    }

    /// Raw log output of a job.
    pub async fn job_trace(&self, project: &ProjectId, job_id: u64) -> Result<String> {
        self.get_text(&format!(
            "projects/{}/jobs/{job_id}/trace",
            project.url_segment()
        ))
        .await
    }
}
