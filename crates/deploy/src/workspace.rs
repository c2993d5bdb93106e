//! Git operations on the checked-out repository.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tokio::process::Command;

/// Pathspec of configuration files that may carry injected RPC URLs.
pub const SENSITIVE_FILES: &str = ":(glob)**/hardhat.config.*";

const DEFAULT_BRANCH: &str = "main";
const COMMIT_USER_NAME: &str = "GitHub Action";
const COMMIT_USER_EMAIL: &str = "action@github.com";

/// The working copy the pipeline runs in.
pub trait Workspace: Send + Sync {
    /// Revert local changes to sensitive configuration files.
    ///
    /// Returns the reverted paths.
    fn scrub_sensitive_files(&self) -> impl Future<Output = Result<Vec<PathBuf>>> + Send;

    /// Commit every change with `message` and push it upstream.
    fn publish(&self, message: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Remote credentials used to push.
#[derive(Debug, Clone)]
pub struct GitRemote {
    /// Server URL, e.g. `https://github.com`.
    pub server_url: String,
    /// `owner/name` of the repository.
    pub repository: String,
    pub token: String,
}

impl GitRemote {
    /// Push URL authenticating with the token.
    pub fn authenticated_url(&self) -> String {
        let host = self
            .server_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        format!(
            "https://x-access-token:{}@{host}/{}",
            self.token, self.repository
        )
    }
}

/// A [`Workspace`] driven through the `git` command line.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    root: PathBuf,
    workflow: String,
    remote: Option<GitRemote>,
}

impl GitWorkspace {
    pub fn new(root: impl Into<PathBuf>, workflow: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            workflow: workflow.into(),
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: GitRemote) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        // Never log the arguments, they may carry the token.
        let subcommand = args.first().copied().unwrap_or_default();
        tracing::debug!(subcommand, root = %self.root.display(), "Running git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .with_context(|| format!("Failed to run git {subcommand}"))?;

        if !output.status.success() {
            anyhow::bail!(
                "git {subcommand} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Workspace for GitWorkspace {
    async fn scrub_sensitive_files(&self) -> Result<Vec<PathBuf>> {
        let modified = self
            .git(&["ls-files", "-m", "--", SENSITIVE_FILES])
            .await
            .context("Failed to list modified configuration files")?;

        let paths: Vec<&str> = modified.lines().filter(|line| !line.is_empty()).collect();
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["checkout", "--"];
        args.extend(&paths);
        self.git(&args)
            .await
            .context("Failed to revert configuration files")?;

        tracing::info!(files = paths.len(), "Reverted sensitive configuration files");
        Ok(paths.into_iter().map(|path| self.root.join(path)).collect())
    }

    async fn publish(&self, message: &str) -> Result<()> {
        let user_name = format!("{COMMIT_USER_NAME} {}", self.workflow);
        self.git(&["config", "user.name", &user_name]).await?;
        self.git(&["config", "user.email", COMMIT_USER_EMAIL]).await?;

        if let Some(remote) = &self.remote {
            self.git(&["remote", "set-url", "origin", &remote.authenticated_url()])
                .await?;
        }

        self.git(&["add", "."]).await?;
        self.git(&["commit", "-m", message]).await?;
        self.git(&["reset", "--hard", "HEAD"]).await?;
        self.git(&["pull", "--rebase", "origin", DEFAULT_BRANCH])
            .await?;
        self.git(&["push"]).await?;

        tracing::info!("Deployment records pushed");
        Ok(())
    }
}
