//! Turns "current" project and merge request references into concrete ids.
//!
//! Candidate paths come from exactly one source, in priority order:
//! workspace roots supplied by the caller, then the `GITLAB_REPO_PATH`
//! override, then the process working directory. The first source that
//! yields any path wins even if none of its paths resolve.

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

use super::client::GitLabClient;
use super::git;
use super::refs::{MergeRequestRef, PipelineTarget, ProjectId, ProjectRef};
use super::types::{MergeRequest, ProjectSnapshot};
use crate::config::REPO_PATH_ENV;

/// Where a set of candidate paths came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    WorkspaceRoots,
    RepoPathOverride,
    WorkingDirectory,
}

/// The three places a local repository may be found.
#[derive(Debug, Clone, Default)]
pub struct SearchSources {
    workspace_roots: Vec<PathBuf>,
    repo_override: Option<PathBuf>,
    working_dir: Option<PathBuf>,
}

impl SearchSources {
    pub fn new(
        workspace_roots: Vec<PathBuf>,
        repo_override: Option<PathBuf>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            workspace_roots,
            repo_override,
            working_dir,
        }
    }

    /// Candidate paths from the highest-priority source that has any.
    pub fn candidates(&self) -> Option<(CandidateSource, Vec<PathBuf>)> {
        if !self.workspace_roots.is_empty() {
            debug!("Using {} workspace roots", self.workspace_roots.len());
            return Some((CandidateSource::WorkspaceRoots, self.workspace_roots.clone()));
        }
        if let Some(path) = &self.repo_override {
            info!("Using {REPO_PATH_ENV}: {}", path.display());
            return Some((CandidateSource::RepoPathOverride, vec![path.clone()]));
        }
        if let Some(cwd) = &self.working_dir {
            debug!("No workspace roots or override, using CWD: {}", cwd.display());
            return Some((CandidateSource::WorkingDirectory, vec![cwd.clone()]));
        }
        None
    }
}

/// Convert a workspace root as advertised by a client (`file://` URI or a
/// plain path) into a filesystem path.
pub fn path_from_root_uri(uri: &str) -> PathBuf {
    if uri.starts_with("file:") {
        if let Some(path) = Url::parse(uri).ok().and_then(|u| u.to_file_path().ok()) {
            return path;
        }
        return PathBuf::from(uri.trim_start_matches("file://"));
    }
    PathBuf::from(uri)
}

/// A local repository matched to a live GitLab project.
#[derive(Debug, Clone, Serialize)]
pub struct RepoContext {
    pub git_root: PathBuf,
    pub project_path: String,
    pub project: ProjectSnapshot,
}

/// Outcome of project resolution: the id to use for API calls, plus the
/// repository context when it had to be detected.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub id: ProjectId,
    pub context: Option<RepoContext>,
}

/// Why a "current" reference could not be determined.
///
/// This is an expected outcome, not a fault. It carries enough detail to
/// render a useful message at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    #[error("Not in a GitLab repository or repository not found on configured GitLab instance")]
    NotInRepository { base_url: String },

    #[error("Could not determine current git branch")]
    BranchUnknown,

    #[error("No open merge request found for branch '{branch}'")]
    NoMergeRequest { branch: String },

    #[error("No pipelines found for MR !{mr_iid}")]
    NoPipelines { mr_iid: u64 },

    #[error("Failed to get pipelines for MR !{mr_iid}: {reason}")]
    PipelinesUnavailable { mr_iid: u64, reason: String },
}

impl ResolutionFailure {
    /// Structured form handed to agent-facing callers.
    pub fn to_json(&self) -> Value {
        let error = self.to_string();
        match self {
            Self::NotInRepository { base_url } => json!({ "error": error, "base_url": base_url }),
            Self::BranchUnknown => json!({
                "error": error,
                "help": "Make sure you're in a git repository with a checked out branch",
            }),
            Self::NoMergeRequest { branch } => json!({
                "error": error,
                "branch": branch,
                "help": "Only open merge requests are considered",
            }),
            Self::NoPipelines { mr_iid } | Self::PipelinesUnavailable { mr_iid, .. } => {
                json!({ "error": error, "mr_iid": mr_iid })
            }
        }
    }
}

/// Resolves "current" references against the local environment.
pub struct ContextResolver<'a> {
    client: &'a GitLabClient,
    sources: SearchSources,
}

impl<'a> ContextResolver<'a> {
    pub fn new(client: &'a GitLabClient, sources: SearchSources) -> Self {
        Self { client, sources }
    }

    fn not_in_repository(&self) -> ResolutionFailure {
        ResolutionFailure::NotInRepository {
            base_url: self.client.base_url().to_string(),
        }
    }

    /// Find the first candidate path that is a git repository whose origin
    /// points at a project visible on the configured instance.
    ///
    /// Each call samples the filesystem and the API afresh.
    pub async fn detect_current_repo(&self) -> Option<RepoContext> {
        let Some((source, paths)) = self.sources.candidates() else {
            debug!("No search paths available");
            return None;
        };
        debug!("Searching {} candidate paths from {source:?}", paths.len());

        for path in paths {
            debug!("Searching for git repository in: {}", path.display());

            let Some(git_root) = git::find_repo_root(&path).await else {
                debug!("No git repository found at: {}", path.display());
                continue;
            };

            let Some(project_path) =
                git::parse_remote_project_path(&git_root, self.client.base_url()).await
            else {
                debug!(
                    "Git repository found but no matching GitLab remote at: {}",
                    git_root.display()
                );
                continue;
            };

            match self
                .client
                .project(&ProjectId::Path(project_path.clone()))
                .await
            {
                Ok(project) => {
                    info!(
                        "Detected GitLab project: {} from {}",
                        project.path_with_namespace,
                        git_root.display()
                    );
                    return Some(RepoContext {
                        git_root,
                        project_path,
                        project,
                    });
                }
                Err(e) => {
                    warn!("Failed to fetch project '{project_path}' from GitLab: {e}");
                }
            }
        }

        debug!("No GitLab repository found in any search path");
        None
    }

    /// Resolve a project reference. Explicit ids pass through untouched.
    pub async fn resolve_project(
        &self,
        project: &ProjectRef,
    ) -> Result<ResolvedProject, ResolutionFailure> {
        match project {
            ProjectRef::Explicit(id) => Ok(ResolvedProject {
                id: id.clone(),
                context: None,
            }),
            ProjectRef::Current => {
                let Some(context) = self.detect_current_repo().await else {
                    warn!("Could not resolve 'current' project - not in a GitLab repository");
                    return Err(self.not_in_repository());
                };
                debug!("Resolved 'current' project to: {}", context.project.id);
                Ok(ResolvedProject {
                    id: ProjectId::Id(context.project.id),
                    context: Some(context),
                })
            }
        }
    }

    /// Open merge request for the branch checked out in the current repository.
    ///
    /// Pass the context from an earlier [`resolve_project`](Self::resolve_project)
    /// call to avoid detecting the repository twice.
    pub async fn current_merge_request(
        &self,
        project: &ProjectId,
        context: Option<&RepoContext>,
    ) -> Result<MergeRequest, ResolutionFailure> {
        let detected;
        let context = match context {
            Some(context) => context,
            None => {
                detected = self.detect_current_repo().await.ok_or_else(|| {
                    warn!("Could not resolve 'current' MR - not in a GitLab repository");
                    self.not_in_repository()
                })?;
                &detected
            }
        };

        let branch = git::current_branch(&context.git_root).await.ok_or_else(|| {
            warn!("Could not resolve 'current' MR - unable to determine current branch");
            ResolutionFailure::BranchUnknown
        })?;

        let found = self
            .client
            .find_open_merge_request_for_branch(project, &branch)
            .await
            .unwrap_or_else(|e| {
                warn!("API error while searching for MR: {e}");
                None
            });

        found.ok_or_else(|| {
            warn!("Could not resolve 'current' MR - no MR found for branch '{branch}'");
            ResolutionFailure::NoMergeRequest { branch }
        })
    }

    /// Resolve a merge request reference to its IID.
    pub async fn resolve_merge_request(
        &self,
        project: &ProjectId,
        merge_request: MergeRequestRef,
        context: Option<&RepoContext>,
    ) -> Result<u64, ResolutionFailure> {
        match merge_request {
            MergeRequestRef::Iid(iid) => Ok(iid),
            MergeRequestRef::Current => {
                let mr = self.current_merge_request(project, context).await?;
                debug!("Resolved 'current' MR to IID: {}", mr.iid);
                Ok(mr.iid)
            }
        }
    }

    /// Resolve which pipeline to wait for. A merge request target resolves to
    /// its most recent pipeline.
    pub async fn resolve_pipeline(
        &self,
        project: &ProjectId,
        target: PipelineTarget,
        context: Option<&RepoContext>,
    ) -> Result<u64, ResolutionFailure> {
        let merge_request = match target {
            PipelineTarget::Id(id) => return Ok(id),
            PipelineTarget::LatestForMergeRequest(merge_request) => merge_request,
        };

        let mr_iid = self
            .resolve_merge_request(project, merge_request, context)
            .await?;

        let pipelines = self
            .client
            .merge_request_pipelines(project, mr_iid)
            .await
            .map_err(|e| {
                warn!("Failed to get pipelines for MR !{mr_iid}: {e}");
                ResolutionFailure::PipelinesUnavailable {
                    mr_iid,
                    reason: e.to_string(),
                }
            })?;

        pipelines
            .first()
            .map(|p| p.id)
            .ok_or(ResolutionFailure::NoPipelines { mr_iid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlab::client::test_support::client;
    use crate::gitlab::git::test_repo;
    use mockito::Matcher;

    const PROJECT_JSON: &str = r#"{"id": 77, "path_with_namespace": "group/app",
        "web_url": "http://gitlab.local/group/app", "default_branch": "main"}"#;

    fn project_path_matcher() -> Matcher {
        Matcher::Regex(r"^/api/v4/projects/group(%2F|/)app$".to_string())
    }

    /// SSH remote for the mock server's host.
    fn origin_for(server_url: &str) -> String {
        let host = Url::parse(server_url).unwrap().host_str().unwrap().to_string();
        format!("git@{host}:group/app.git")
    }

    #[test]
    fn test_workspace_roots_win_exclusively() {
        let sources = SearchSources::new(
            vec![PathBuf::from("/roots/a"), PathBuf::from("/roots/b")],
            Some(PathBuf::from("/override")),
            Some(PathBuf::from("/cwd")),
        );
        let (source, paths) = sources.candidates().unwrap();
        assert_eq!(source, CandidateSource::WorkspaceRoots);
        assert_eq!(paths, vec![PathBuf::from("/roots/a"), PathBuf::from("/roots/b")]);
    }

    #[test]
    fn test_override_then_working_directory() {
        let sources = SearchSources::new(
            vec![],
            Some(PathBuf::from("/override")),
            Some(PathBuf::from("/cwd")),
        );
        assert_eq!(
            sources.candidates(),
            Some((CandidateSource::RepoPathOverride, vec![PathBuf::from("/override")]))
        );

        let sources = SearchSources::new(vec![], None, Some(PathBuf::from("/cwd")));
        assert_eq!(
            sources.candidates(),
            Some((CandidateSource::WorkingDirectory, vec![PathBuf::from("/cwd")]))
        );

        assert_eq!(SearchSources::default().candidates(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_path_from_root_uri() {
        assert_eq!(
            path_from_root_uri("file:///home/dev/my%20repo"),
            PathBuf::from("/home/dev/my repo")
        );
        assert_eq!(path_from_root_uri("/plain/path"), PathBuf::from("/plain/path"));
    }

    #[test]
    fn test_failure_json_carries_base_url() {
        let failure = ResolutionFailure::NotInRepository {
            base_url: "https://gitlab.example.com".to_string(),
        };
        let value = failure.to_json();
        assert_eq!(value["base_url"], "https://gitlab.example.com");
        assert!(value["error"]
            .as_str()
            .unwrap()
            .contains("Not in a GitLab repository"));
    }

    #[tokio::test]
    async fn test_explicit_project_passes_through_without_network() {
        let client = client("http://127.0.0.1:1");
        let resolver = ContextResolver::new(&client, SearchSources::default());

        let resolved = resolver
            .resolve_project(&"group/app".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(resolved.id, ProjectId::Path("group/app".to_string()));
        assert!(resolved.context.is_none());

        let iid = resolver
            .resolve_merge_request(&resolved.id, MergeRequestRef::Iid(4), None)
            .await
            .unwrap();
        assert_eq!(iid, 4);
    }

    #[tokio::test]
    async fn test_current_outside_repository_is_structured_failure() {
        let dir = tempfile::tempdir().unwrap();
        let client = client("https://gitlab.example.com");
        let sources = SearchSources::new(vec![], None, Some(dir.path().to_path_buf()));
        let resolver = ContextResolver::new(&client, sources);

        let failure = resolver
            .resolve_project(&ProjectRef::Current)
            .await
            .unwrap_err();
        assert_eq!(
            failure,
            ResolutionFailure::NotInRepository {
                base_url: "https://gitlab.example.com".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_failed_workspace_root_does_not_fall_back() {
        let mut server = mockito::Server::new_async().await;
        let origin = origin_for(&server.url());
        let Some(repo) = test_repo::init(Some(origin.as_str()), "main") else {
            return;
        };
        let project = server
            .mock("GET", project_path_matcher())
            .with_body(PROJECT_JSON)
            .expect(0)
            .create_async()
            .await;

        let not_a_repo = tempfile::tempdir().unwrap();
        let client = client(&server.url());
        let sources = SearchSources::new(
            vec![not_a_repo.path().to_path_buf()],
            Some(repo.path().to_path_buf()),
            Some(repo.path().to_path_buf()),
        );
        let resolver = ContextResolver::new(&client, sources);

        let failure = resolver
            .resolve_project(&ProjectRef::Current)
            .await
            .unwrap_err();
        assert!(matches!(failure, ResolutionFailure::NotInRepository { .. }));
        project.assert_async().await;
    }

    #[tokio::test]
    async fn test_current_project_and_merge_request_share_context() {
        let mut server = mockito::Server::new_async().await;
        let origin = origin_for(&server.url());
        let Some(repo) = test_repo::init(Some(origin.as_str()), "feature/login") else {
            return;
        };
        let project = server
            .mock("GET", project_path_matcher())
            .with_body(PROJECT_JSON)
            .expect(1)
            .create_async()
            .await;
        let merge_requests = server
            .mock("GET", "/api/v4/projects/77/merge_requests")
            .match_query(Matcher::UrlEncoded("state".into(), "opened".into()))
            .with_body(
                r#"[{"id": 900, "iid": 12, "title": "Login", "state": "opened",
                     "source_branch": "feature/login", "target_branch": "main"}]"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let sources = SearchSources::new(vec![repo.path().to_path_buf()], None, None);
        let resolver = ContextResolver::new(&client, sources);

        let resolved = resolver
            .resolve_project(&ProjectRef::Current)
            .await
            .unwrap();
        assert_eq!(resolved.id, ProjectId::Id(77));
        let context = resolved.context.as_ref().unwrap();
        assert_eq!(context.project_path, "group/app");

        let iid = resolver
            .resolve_merge_request(&resolved.id, MergeRequestRef::Current, Some(context))
            .await
            .unwrap();
        assert_eq!(iid, 12);

        project.assert_async().await;
        merge_requests.assert_async().await;
    }

    #[tokio::test]
    async fn test_current_merge_request_missing_for_branch() {
        let mut server = mockito::Server::new_async().await;
        let origin = origin_for(&server.url());
        let Some(repo) = test_repo::init(Some(origin.as_str()), "topic") else {
            return;
        };
        let _project = server
            .mock("GET", project_path_matcher())
            .with_body(PROJECT_JSON)
            .create_async()
            .await;
        let _merge_requests = server
            .mock("GET", "/api/v4/projects/77/merge_requests")
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;

        let client = client(&server.url());
        let sources = SearchSources::new(vec![repo.path().to_path_buf()], None, None);
        let resolver = ContextResolver::new(&client, sources);

        let failure = resolver
            .resolve_merge_request(&ProjectId::Id(77), MergeRequestRef::Current, None)
            .await
            .unwrap_err();
        assert_eq!(
            failure,
            ResolutionFailure::NoMergeRequest {
                branch: "topic".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_pipeline_target_resolution() {
        let mut server = mockito::Server::new_async().await;
        let _latest = server
            .mock("GET", "/api/v4/projects/3/merge_requests/8/pipelines")
            .with_body(r#"[{"id": 502, "status": "running"}, {"id": 480, "status": "failed"}]"#)
            .create_async()
            .await;
        let _empty = server
            .mock("GET", "/api/v4/projects/3/merge_requests/9/pipelines")
            .with_body("[]")
            .create_async()
            .await;

        let client = client(&server.url());
        let resolver = ContextResolver::new(&client, SearchSources::default());
        let project = ProjectId::Id(3);

        assert_eq!(
            resolver
                .resolve_pipeline(&project, PipelineTarget::Id(11), None)
                .await,
            Ok(11)
        );
        assert_eq!(
            resolver
                .resolve_pipeline(
                    &project,
                    PipelineTarget::LatestForMergeRequest(MergeRequestRef::Iid(8)),
                    None
                )
                .await,
            Ok(502)
        );
        assert_eq!(
            resolver
                .resolve_pipeline(
                    &project,
                    PipelineTarget::LatestForMergeRequest(MergeRequestRef::Iid(9)),
                    None
                )
                .await,
            Err(ResolutionFailure::NoPipelines { mr_iid: 9 })
        );
    }
}
