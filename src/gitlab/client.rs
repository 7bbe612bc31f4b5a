//! GitLab REST client: the shared HTTP primitives in [`core`] plus one
//! `impl` block per endpoint group.

mod core;
mod merge_requests;
mod pipelines;
mod projects;

pub use self::core::{GitLabClient, PageRequest, PageResult, QueryParams};

#[cfg(test)]
pub(crate) use self::core::test_support;
