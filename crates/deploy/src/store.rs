//! Job-scoped state shared between the steps of a pipeline job.
//!
//! Steps run as separate processes, so the only handoff is a set of JSON files
//! under `<workspace>/.tenderly`:
//!
//! - `infra/<job>.json`: the [`InfrastructureInfo`] of the job.
//! - `tmp/*.json`: raw build logs awaiting parsing.
//! - `<job>-deployments.json`: the parsed deployments of the job.
//!
//! Callers address state by [`RunContext`]; the paths are private to the store.
//! Write failures never abort the caller, they are reported as warnings.

use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    InfrastructureInfo, Networks, ParsedDeployments, RunContext,
    error::{self, Result, VnetError},
};

/// Name of the state directory at the workspace root.
pub const STATE_DIR: &str = ".tenderly";

const INFRA_DIR: &str = "infra";
const BUILD_OUTPUT_DIR: &str = "tmp";
const DEPLOYMENTS_SUFFIX: &str = "-deployments.json";

/// File-backed store for the state of one job.
#[derive(Debug, Clone)]
pub struct StateStore {
    ctx: RunContext,
    root: PathBuf,
}

impl StateStore {
    pub fn new(ctx: RunContext) -> Self {
        let root = ctx.workspace.join(STATE_DIR);
        Self { ctx, root }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Directory the build tools write their logs into.
    pub fn build_output_dir(&self) -> PathBuf {
        self.root.join(BUILD_OUTPUT_DIR)
    }

    /// Log file for the testnet identified by `slug`.
    pub fn build_output_file(&self, slug: &str) -> PathBuf {
        self.build_output_dir().join(format!("{slug}.json"))
    }

    fn infra_path(&self) -> PathBuf {
        self.root
            .join(INFRA_DIR)
            .join(format!("{}.json", self.ctx.job_basename()))
    }

    fn deployments_path(&self) -> PathBuf {
        self.root
            .join(format!("{}{DEPLOYMENTS_SUFFIX}", self.ctx.job_basename()))
    }

    /// Persist the networks provisioned by this job, without their admin RPC URLs.
    ///
    /// Returns the written path, or `None` if persistence failed.
    pub async fn store_infrastructure_info(&self, networks: &Networks) -> Result<Option<PathBuf>> {
        let info = InfrastructureInfo::new(networks.sanitized(), &self.ctx);
        let path = self.infra_path();

        let stored = error::recover(write_json(&path, &info).await.map(|_| path))?;
        if let Some(path) = &stored {
            tracing::info!(
                path = %path.display(),
                networks = info.networks.len(),
                "Infrastructure information stored"
            );
        }
        Ok(stored)
    }

    /// Read the infrastructure record of this job.
    ///
    /// A missing file is expected when no provisioning ran in this job and yields
    /// `None`. Unreadable or corrupt files are reported and also yield `None`.
    pub async fn read_infra_for_current_job(&self) -> Result<Option<InfrastructureInfo>> {
        let path = self.infra_path();
        let info = error::recover(read_json(&path).await)?.flatten();
        if info.is_none() {
            tracing::debug!(path = %path.display(), "No infrastructure file found");
        }
        Ok(info)
    }

    /// Rewrite the persisted record without admin RPC URLs.
    ///
    /// Only writes when something changes. Returns the sanitized record.
    pub async fn sanitize_persisted_infra(
        &self,
        infra: &InfrastructureInfo,
    ) -> Result<InfrastructureInfo> {
        let sanitized = infra.sanitized();
        if sanitized == *infra {
            return Ok(sanitized);
        }

        let path = self.infra_path();
        if error::recover(write_json(&path, &sanitized).await)?.is_some() {
            tracing::info!(path = %path.display(), "Removed admin RPC URLs from infrastructure file");
        }
        Ok(sanitized)
    }

    /// Persist the deployments parsed for this job.
    pub async fn store_parsed_deployments(
        &self,
        deployments: &ParsedDeployments,
    ) -> Result<Option<PathBuf>> {
        let path = self.deployments_path();
        let stored = error::recover(write_json(&path, deployments).await.map(|_| path))?;
        if let Some(path) = &stored {
            tracing::info!(
                path = %path.display(),
                groups = deployments.deployments.len(),
                "Parsed deployments stored"
            );
        }
        Ok(stored)
    }

    /// Create the build output directory if it does not exist yet.
    pub async fn ensure_build_output_dir(&self) -> Result<Option<PathBuf>> {
        let dir = self.build_output_dir();
        let created = tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create build output directory")
            .map_err(|err| VnetError::persistence(&dir, err))
            .map(|_| dir);

        let created = error::recover(created)?;
        if let Some(dir) = &created {
            tracing::info!(path = %dir.display(), "Build output directory ready");
        }
        Ok(created)
    }

    /// Remove the build output directory and every log in it.
    pub async fn discard_build_output_dir(&self) -> Result<()> {
        let dir = self.build_output_dir();
        let removed = match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(VnetError::persistence(
                &dir,
                anyhow::Error::new(err).context("Failed to remove build output directory"),
            )),
        };

        if error::recover(removed)?.is_some() {
            tracing::debug!(path = %dir.display(), "Build output directory discarded");
        }
        Ok(())
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let write = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create state directory")?;
        }
        let json = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
        tokio::fs::write(path, json)
            .await
            .context("Failed to write state file")?;
        anyhow::Ok(())
    };

    write.await.map_err(|err| VnetError::persistence(path, err))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(VnetError::persistence(
                path,
                anyhow::Error::new(err).context("Failed to read state file"),
            ));
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .context("Failed to parse state file")
        .map_err(|err| VnetError::persistence(path, err))
}
