use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use gitlab_context::config::Config;
use gitlab_context::gitlab::resolver::{path_from_root_uri, ResolvedProject};
use gitlab_context::gitlab::wait::FinalStatus;
use gitlab_context::gitlab::{
    ContextResolver, GitLabClient, MergeRequestRef, PageRequest, PipelineTarget, PipelineWaiter,
    ProjectRef, QueryParams, ResolutionFailure, SearchSources,
};
use gitlab_context::output::{print_wait_summary, WaitSpinner};

#[derive(Parser)]
#[command(name = "gitlab-context")]
#[command(author, version, about = "GitLab Context Tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// GitLab personal access token
    #[arg(short, long, global = true)]
    token: Option<String>,

    /// GitLab instance base URL
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Skip the `/version` probe on startup
    #[arg(long, global = true, default_value_t = false)]
    no_validate: bool,

    /// Workspace root to search for the repository (path or file:// URI)
    #[arg(short = 'w', long = "workspace-root", global = true)]
    workspace_roots: Vec<String>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Args)]
struct ProjectArg {
    /// Project ID, path or "current"
    #[arg(short = 'P', long, default_value = "current")]
    project: ProjectRef,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a project and print it with its local repository context
    Project {
        #[arg(default_value = "current")]
        reference: ProjectRef,
    },

    /// Resolve a merge request
    Mr {
        #[command(flatten)]
        project: ProjectArg,

        /// MR IID (`42` or `!42`) or "current"
        #[arg(default_value = "current")]
        merge_request: MergeRequestRef,
    },

    /// List recent pipelines
    Pipelines {
        #[command(flatten)]
        project: ProjectArg,

        /// Only pipelines for this branch or tag
        #[arg(short = 'r', long = "ref")]
        git_ref: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Block until a pipeline finishes
    Wait {
        #[command(flatten)]
        project: ProjectArg,

        #[arg(long, conflicts_with = "mr", required_unless_present = "mr")]
        pipeline: Option<u64>,

        /// Wait for the latest pipeline of this MR (IID or "current")
        #[arg(long)]
        mr: Option<MergeRequestRef>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds between status checks
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,

        #[arg(long, default_value_t = false)]
        no_failed_logs: bool,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Raw paginated GET against the REST API
    Get {
        /// Endpoint relative to /api/v4, e.g. `projects/123/jobs`
        endpoint: String,

        #[arg(long, default_value_t = 100)]
        per_page: usize,

        #[arg(long, default_value_t = 100)]
        max_pages: usize,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_env();

        if let Some(token) = &self.token {
            config.gitlab.token = Some(token.clone());
        }
        if let Some(url) = &self.url {
            config.gitlab.base_url = url.clone();
        }
        if self.no_validate {
            config.gitlab.validate = false;
        }
        Ok(config)
    }

    fn search_sources(&self, config: &Config) -> SearchSources {
        SearchSources::new(
            self.workspace_roots
                .iter()
                .map(|root| path_from_root_uri(root))
                .collect(),
            config.gitlab.repo_path.clone(),
            std::env::current_dir().ok(),
        )
    }

    fn emit(&self, value: &impl Serialize) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }

    /// Print the structured failure and turn it into an error exit.
    fn fail(&self, failure: ResolutionFailure) -> anyhow::Error {
        if let Err(e) = self.emit(&failure.to_json()) {
            warn!("Could not write resolution failure: {e}");
        }
        failure.into()
    }

    async fn resolve_project(
        &self,
        resolver: &ContextResolver<'_>,
        project: &ProjectRef,
    ) -> Result<ResolvedProject> {
        resolver
            .resolve_project(project)
            .await
            .map_err(|failure| self.fail(failure))
    }

    async fn execute_project(
        &self,
        client: &GitLabClient,
        resolver: &ContextResolver<'_>,
        reference: &ProjectRef,
    ) -> Result<()> {
        let resolved = self.resolve_project(resolver, reference).await?;
        match resolved.context {
            Some(context) => self.emit(&context),
            None => self.emit(&client.project(&resolved.id).await?),
        }
    }

    async fn execute_mr(
        &self,
        client: &GitLabClient,
        resolver: &ContextResolver<'_>,
        project: &ProjectRef,
        merge_request: MergeRequestRef,
    ) -> Result<()> {
        let resolved = self.resolve_project(resolver, project).await?;
        let mr = match merge_request {
            MergeRequestRef::Iid(iid) => client.merge_request(&resolved.id, iid).await?,
            MergeRequestRef::Current => resolver
                .current_merge_request(&resolved.id, resolved.context.as_ref())
                .await
                .map_err(|failure| self.fail(failure))?,
        };
        self.emit(&mr)
    }

    async fn execute_pipelines(
        &self,
        client: &GitLabClient,
        resolver: &ContextResolver<'_>,
        project: &ProjectRef,
        ref_: Option<&str>,
        limit: usize,
    ) -> Result<()> {
        let resolved = self.resolve_project(resolver, project).await?;
        let mut pipelines = client
            .pipelines(&resolved.id, ref_, PageRequest::new(limit, 1))
            .await?
            .into_items();
        pipelines.truncate(limit);
        self.emit(&pipelines)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_wait(
        &self,
        config: &Config,
        client: &GitLabClient,
        resolver: &ContextResolver<'_>,
        project: &ProjectRef,
        target: PipelineTarget,
        timeout: Option<u64>,
        interval: Option<u64>,
        no_failed_logs: bool,
        json: bool,
    ) -> Result<()> {
        let resolved = self.resolve_project(resolver, project).await?;
        let pipeline_id = resolver
            .resolve_pipeline(&resolved.id, target, resolved.context.as_ref())
            .await
            .map_err(|failure| self.fail(failure))?;

        let mut options = config.wait.options();
        if let Some(timeout) = timeout {
            options.timeout = std::time::Duration::from_secs(timeout);
        }
        if let Some(interval) = interval {
            options.check_interval = std::time::Duration::from_secs(interval);
        }
        if no_failed_logs {
            options.include_failed_logs = false;
        }

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling wait");
                on_interrupt.cancel();
            }
        });

        let spinner = (!json).then(|| WaitSpinner::start(pipeline_id));
        let outcome = PipelineWaiter::new(client, options)
            .wait(&resolved.id, pipeline_id, &cancel)
            .await;

        if let Some(spinner) = spinner {
            match &outcome {
                Ok(result) => spinner.finish(result.final_status),
                Err(_) => spinner.abandon(),
            }
        }
        let result = outcome?;

        if json || self.output.is_some() {
            self.emit(&result)?;
        } else {
            print_wait_summary(&result);
        }

        if result.final_status != FinalStatus::Success {
            bail!(
                "Pipeline {pipeline_id} finished with status '{}'",
                result.final_status
            );
        }
        Ok(())
    }

    async fn execute_get(
        &self,
        client: &GitLabClient,
        endpoint: &str,
        per_page: usize,
        max_pages: usize,
    ) -> Result<()> {
        let page = client
            .get_paginated::<serde_json::Value>(
                endpoint,
                &QueryParams::new(),
                PageRequest::new(per_page, max_pages),
            )
            .await?;

        self.emit(&json!({
            "items": page.items,
            "pages_fetched": page.pages_fetched,
            "capped": page.capped,
        }))
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.load_config()?;
        let settings = config.gitlab.settings()?;
        let client = GitLabClient::connect(&settings).await?;
        let resolver = ContextResolver::new(&client, self.search_sources(&config));

        match &self.command {
            Commands::Project { reference } => {
                self.execute_project(&client, &resolver, reference).await
            }
            Commands::Mr {
                project,
                merge_request,
            } => {
                self.execute_mr(&client, &resolver, &project.project, *merge_request)
                    .await
            }
            Commands::Pipelines {
                project,
                git_ref,
                limit,
            } => {
                self.execute_pipelines(
                    &client,
                    &resolver,
                    &project.project,
                    git_ref.as_deref(),
                    *limit,
                )
                .await
            }
            Commands::Wait {
                project,
                pipeline,
                mr,
                timeout,
                interval,
                no_failed_logs,
                json,
            } => {
                let target = match (pipeline, mr) {
                    (Some(id), _) => PipelineTarget::Id(*id),
                    (None, Some(mr)) => PipelineTarget::LatestForMergeRequest(*mr),
                    (None, None) => bail!("either --pipeline or --mr is required"),
                };
                self.execute_wait(
                    &config,
                    &client,
                    &resolver,
                    &project.project,
                    target,
                    *timeout,
                    *interval,
                    *no_failed_logs,
                    *json,
                )
                .await
            }
            Commands::Get {
                endpoint,
                per_page,
                max_pages,
            } => {
                self.execute_get(&client, endpoint, *per_page, *max_pages)
                    .await
            }
        }
    }
}
