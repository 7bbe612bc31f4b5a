//! Resolve "current" GitLab context (project, merge request, pipeline) from
//! the local git checkout, page through the REST API and block until a
//! pipeline finishes.

pub mod auth;
pub mod config;
pub mod error;
pub mod gitlab;
pub mod output;

pub use error::{GitLabError, Result};
