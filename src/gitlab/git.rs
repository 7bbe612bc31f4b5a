//! Local git inspection: repository root, `origin` remote and current branch.
//!
//! Every function here degrades to `None` on failure (not a repository, git
//! missing, slow filesystem). An unknown local context is routine for the
//! resolver, so nothing in this module returns an error.

use log::{debug, error};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);
const ORIGIN: &str = "origin";

/// Run a git subcommand in `dir` and return its trimmed stdout.
async fn run_git(dir: &Path, args: &[&str]) -> Option<String> {
    if !dir.is_dir() {
        debug!("Not a directory, skipping git {}: {}", args.join(" "), dir.display());
        return None;
    }

    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(GIT_TIMEOUT, command.output()).await {
        Err(_) => {
            error!("Git command timed out at {}", dir.display());
            return None;
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            error!("Git command not found - is git installed?");
            return None;
        }
        Ok(Err(e)) => {
            debug!("Error running git {}: {e}", args.join(" "));
            return None;
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        debug!(
            "git {} failed at {}: {}",
            args.join(" "),
            dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let stdout = String::from_utf8(output.stdout).ok()?;
    let stdout = stdout.trim();
    (!stdout.is_empty()).then(|| stdout.to_string())
}

/// Root of the repository enclosing `path`. Works with worktrees.
pub async fn find_repo_root(path: &Path) -> Option<PathBuf> {
    let root = run_git(path, &["rev-parse", "--show-toplevel"]).await;
    match &root {
        Some(root) => debug!("Found git repository at {root}"),
        None => debug!("Not a git repository: {}", path.display()),
    }
    root.map(PathBuf::from)
}

pub async fn remote_url(repo_root: &Path, remote: &str) -> Option<String> {
    let url = run_git(repo_root, &["remote", "get-url", remote]).await;
    match &url {
        Some(url) => debug!("Found remote URL: {url}"),
        None => debug!("No git remote '{remote}' found at {}", repo_root.display()),
    }
    url
}

/// Checked-out branch name; `None` for a detached HEAD.
pub async fn current_branch(repo_root: &Path) -> Option<String> {
    let branch = run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .filter(|b| b != "HEAD");
    match &branch {
        Some(branch) => debug!("Current branch: {branch}"),
        None => debug!("No current branch at {}", repo_root.display()),
    }
    branch
}

/// Project path (`group/.../project`) of the `origin` remote, provided the
/// remote points at the GitLab instance behind `base_url`.
pub async fn parse_remote_project_path(repo_root: &Path, base_url: &str) -> Option<String> {
    let remote = remote_url(repo_root, ORIGIN).await?;
    let path = RemoteGrammar::for_base_url(base_url)?.project_path(&remote);
    match &path {
        Some(path) => debug!("Parsed project path: {path}"),
        None => debug!("Remote URL {remote} does not match GitLab instance {base_url}"),
    }
    path
}

/// Host-anchored patterns for the two remote URL shapes GitLab hands out.
#[derive(Debug, Clone)]
pub struct RemoteGrammar {
    ssh: Regex,
    https: Regex,
}

impl RemoteGrammar {
    /// Build the grammar for an instance URL such as `https://gitlab.example.com:8443/gitlab`.
    ///
    /// SSH remotes are matched on the host alone; HTTP(S) remotes must also
    /// carry the same port and path prefix as the instance URL.
    pub fn for_base_url(base_url: &str) -> Option<Self> {
        let url = Url::parse(base_url).ok()?;
        let host = url.host_str()?;
        let host_port = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let prefix = match url.path().trim_matches('/') {
            "" => String::new(),
            p => format!("{}/", regex::escape(p)),
        };

        let ssh = Regex::new(&format!(
            r"^(?:[^@\s/]+@(?i:{host}):|ssh://[^@\s/]+@(?i:{host})(?::\d+)?/)(?P<path>\S+?)(?:\.git)?/?$",
            host = regex::escape(host),
        ))
        .ok()?;
        let https = Regex::new(&format!(
            r"^https?://(?:[^@\s/]+@)?(?i:{host})/{prefix}(?P<path>\S+?)(?:\.git)?/?$",
            host = regex::escape(&host_port),
        ))
        .ok()?;

        Some(Self { ssh, https })
    }

    /// Extract the project path from a remote URL, or `None` when the remote
    /// belongs to another host.
    pub fn project_path(&self, remote: &str) -> Option<String> {
        let remote = remote.trim();
        let captures = self
            .ssh
            .captures(remote)
            .or_else(|| self.https.captures(remote))?;
        let path = captures.name("path")?.as_str().trim_matches('/');
        (!path.is_empty()).then(|| path.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_repo {
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    pub(crate) fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args([
                "-c",
                "user.name=Test",
                "-c",
                "user.email=test@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {args:?} failed");
    }

    /// A throwaway repository with one commit on `branch`, or `None` when
    /// git is not installed.
    pub(crate) fn init(origin: Option<&str>, branch: &str) -> Option<TempDir> {
        if !git_available() {
            return None;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["commit", "--quiet", "--allow-empty", "-m", "init"]);
        git(dir.path(), &["checkout", "--quiet", "-B", branch]);
        if let Some(origin) = origin {
            git(dir.path(), &["remote", "add", "origin", origin]);
        }
        Some(dir)
    }
}
