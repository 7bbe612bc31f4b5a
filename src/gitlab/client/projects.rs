use super::core::{GitLabClient, QueryParams};
use crate::error::Result;
use crate::gitlab::refs::ProjectId;
use crate::gitlab::types::ProjectSnapshot;

impl GitLabClient {
    /// Get a project by numeric ID or full path.
    pub async fn project(&self, project: &ProjectId) -> Result<ProjectSnapshot> {
        self.get(
            &format!("projects/{}", project.url_segment()),
            &QueryParams::new(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::error::GitLabError;
    use crate::gitlab::client::test_support::client;
    use crate::gitlab::refs::ProjectId;

    #[tokio::test]
    async fn test_project_by_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v4/projects/42")
            .with_body(
                r#"{"id": 42, "path_with_namespace": "group/app",
                    "web_url": "https://gitlab.com/group/app", "default_branch": "main"}"#,
            )
            .create_async()
            .await;

        let project = client(&server.url())
            .project(&ProjectId::Id(42))
            .await
            .unwrap();
        assert_eq!(project.path_with_namespace, "group/app");
        assert_eq!(project.default_branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_missing_project_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v4/projects/7")
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server.url())
            .project(&ProjectId::Id(7))
            .await
            .unwrap_err();
        assert!(matches!(err, GitLabError::NotFound(_)));
    }
}
