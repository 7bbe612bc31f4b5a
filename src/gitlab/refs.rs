//! Typed project, merge request and pipeline references.
//!
//! Callers may name an explicit identifier or ask for the "current" one,
//! which must be resolved against the local working tree before any API
//! call is made.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::GitLabError;

/// Reserved value meaning "infer from the local environment".
pub const CURRENT: &str = "current";

/// A concrete GitLab project identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ProjectId {
    Id(u64),
    Path(String),
}

impl ProjectId {
    /// The identifier as a single URL path segment (`group/app` becomes `group%2Fapp`).
    pub fn url_segment(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Path(path) => urlencoding::encode(path).into_owned(),
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Path(path) => f.write_str(path),
        }
    }
}

/// A project as named by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectRef {
    Explicit(ProjectId),
    Current,
}

impl FromStr for ProjectRef {
    type Err = GitLabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(CURRENT) {
            return Ok(Self::Current);
        }
        if let Ok(id) = s.parse::<u64>() {
            return Ok(Self::Explicit(ProjectId::Id(id)));
        }
        let path = s.trim_matches('/');
        if path.is_empty() {
            return Err(GitLabError::InvalidReference(
                "project reference cannot be empty".to_string(),
            ));
        }
        Ok(Self::Explicit(ProjectId::Path(path.to_string())))
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(id) => id.fmt(f),
            Self::Current => f.write_str(CURRENT),
        }
    }
}

/// A merge request as named by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRequestRef {
    Iid(u64),
    Current,
}

impl FromStr for MergeRequestRef {
    type Err = GitLabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(CURRENT) {
            return Ok(Self::Current);
        }
        s.trim_start_matches('!')
            .parse::<u64>()
            .map(Self::Iid)
            .map_err(|_| {
                GitLabError::InvalidReference(format!(
                    "merge request must be a numeric IID or '{CURRENT}', got: '{s}'"
                ))
            })
    }
}

impl fmt::Display for MergeRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iid(iid) => write!(f, "!{iid}"),
            Self::Current => f.write_str(CURRENT),
        }
    }
}

/// Which pipeline to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineTarget {
    Id(u64),
    /// The most recent pipeline of a merge request.
    LatestForMergeRequest(MergeRequestRef),
}
