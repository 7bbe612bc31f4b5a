use log::{debug, info};

use super::core::{GitLabClient, PageRequest, PageResult, QueryParams};
use crate::error::Result;
use crate::gitlab::refs::ProjectId;
use crate::gitlab::types::{MergeRequest, Pipeline};

impl GitLabClient {
    /// List merge requests in a given state, most recently updated first.
    pub async fn merge_requests(
        &self,
        project: &ProjectId,
        state: &str,
        page: PageRequest,
    ) -> Result<PageResult<MergeRequest>> {
        let params = QueryParams::from([
            ("state".to_string(), state.to_string()),
            ("order_by".to_string(), "updated_at".to_string()),
            ("sort".to_string(), "desc".to_string()),
        ]);
        self.get_paginated(
            &format!("projects/{}/merge_requests", project.url_segment()),
            &params,
            page,
        )
        .await
    }

    pub async fn merge_request(&self, project: &ProjectId, iid: u64) -> Result<MergeRequest> {
        self.get(
            &format!("projects/{}/merge_requests/{iid}", project.url_segment()),
            &QueryParams::new(),
        )
        .await
    }

    /// Pipelines of a merge request, newest first.
    pub async fn merge_request_pipelines(
        &self,
        project: &ProjectId,
        iid: u64,
    ) -> Result<Vec<Pipeline>> {
        self.get(
            &format!(
                "projects/{}/merge_requests/{iid}/pipelines",
                project.url_segment()
            ),
            &QueryParams::new(),
        )
        .await
    }

    /// First open merge request whose source branch is exactly `branch`.
    ///
    /// GitLab allows several open merge requests per source branch. The list
    /// is requested newest-updated first, so the winner is the most recently
    /// updated one.
    pub async fn find_open_merge_request_for_branch(
        &self,
        project: &ProjectId,
        branch: &str,
    ) -> Result<Option<MergeRequest>> {
        debug!("Looking for MR with source branch '{branch}' in project {project}");
        let open = self
            .merge_requests(project, "opened", PageRequest::default())
            .await?;

        let found = open
            .into_items()
            .into_iter()
            .find(|mr| mr.source_branch == branch);

        match &found {
            Some(mr) => info!("Found MR !{} for branch '{branch}'", mr.iid),
            None => debug!("No open MR found for branch '{branch}'"),
        }
        Ok(found)
    }
}
