//! Run context shared by every pipeline step of a job.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifies the workflow run and job the current process belongs to.
///
/// Every component that derives names or paths from the run receives this value
/// explicitly. Only the binary reads it from the process environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique id of the workflow run.
    pub run_id: u64,
    /// Sequential number of the run within the workflow.
    pub run_number: u64,
    /// Workflow name.
    pub workflow: String,
    /// Job id within the workflow.
    pub job: String,
    /// Root of the checked-out repository.
    pub workspace: PathBuf,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            run_id: 0,
            run_number: 0,
            workflow: String::new(),
            job: String::new(),
            workspace: PathBuf::from("."),
        }
    }
}

impl RunContext {
    /// File basename shared by every step of this job in this run.
    ///
    /// Two steps of the same job resolve to the same name, two jobs of the same
    /// run never do.
    pub fn job_basename(&self) -> String {
        sanitize(&format!("{}-{}-{}", self.run_number, self.workflow, self.job))
    }

    /// Identifier of the build, shared by all jobs of the run.
    pub fn build_slug(&self) -> String {
        format!("{}-{}", self.run_number, self.run_id)
    }

    /// Unique slug for the virtual testnet forking `network_id` in this job.
    pub fn testnet_slug(&self, testnet_name: &str, network_id: &str) -> String {
        sanitize(&format!(
            "{}-{}-net-{}-{}-{}-{}",
            self.run_number, testnet_name, network_id, self.workflow, self.job, self.run_id
        ))
    }
}

/// Lower-cases `name`, folds whitespace runs and slashes into `-` and drops every
/// character outside `[a-z0-9-]`.
pub(crate) fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for c in name.trim().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        match c {
            '/' => out.push('-'),
            c if c.is_ascii_alphanumeric() || c == '-' => out.push(c.to_ascii_lowercase()),
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RunContext {
        RunContext {
            run_id: 9876543210,
            run_number: 42,
            workflow: "Deploy Contracts".to_string(),
            job: "build_and_test".to_string(),
            workspace: PathBuf::from("/tmp/workspace"),
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Hello World"), "hello-world");
        assert_eq!(sanitize("ci/cd  pipeline"), "ci-cd-pipeline");
        assert_eq!(sanitize("job_1 (matrix: 137)"), "job1-matrix-137");
        assert_eq!(sanitize("  trimmed  "), "trimmed");
        assert_eq!(sanitize("already-clean-123"), "already-clean-123");
    }

    #[test]
    fn test_job_basename() {
        assert_eq!(context().job_basename(), "42-deploy-contracts-buildandtest");
    }

    #[test]
    fn test_job_basename_differs_per_job() {
        let mut other = context();
        other.job = "deploy".to_string();
        assert_ne!(context().job_basename(), other.job_basename());
    }

    #[test]
    fn test_build_slug() {
        assert_eq!(context().build_slug(), "42-9876543210");
    }

    #[test]
    fn test_testnet_slug() {
        assert_eq!(
            context().testnet_slug("My TestNet", "137"),
            "42-my-testnet-net-137-deploy-contracts-buildandtest-9876543210"
        );
    }

    #[test]
    fn test_testnet_slug_unique_per_network() {
        let ctx = context();
        let network_ids = ["1", "10", "137", "8453", "11155111"];
        let slugs: std::collections::BTreeSet<_> = network_ids
            .iter()
            .map(|id| ctx.testnet_slug("ci", id))
            .collect();
        assert_eq!(slugs.len(), network_ids.len());
    }
}
