pub mod client;
pub mod git;
pub mod links;
pub mod refs;
pub mod resolver;
pub mod types;
pub mod wait;

pub use client::{GitLabClient, PageRequest, PageResult, QueryParams};
pub use refs::{MergeRequestRef, PipelineTarget, ProjectId, ProjectRef};
pub use resolver::{ContextResolver, RepoContext, ResolutionFailure, SearchSources};
pub use wait::{PipelineWaitResult, PipelineWaiter, WaitOptions};
