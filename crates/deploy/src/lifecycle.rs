//! End-of-job cleanup of the provisioned testnets.
//!
//! In CI mode every testnet of the job is paused. In CD mode the testnets keep
//! running; the build logs are reconciled into deployment records that are
//! optionally committed back to the repository.

use std::path::PathBuf;

use futures::future::join_all;

use crate::{
    Mode, Networks, ParsedDeployments, StateStore,
    deployment_logs::parse_log_dir,
    error::{self, Result, VnetError},
    provider::VnetProvider,
    workspace::Workspace,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupConfig {
    pub mode: Mode,
    /// Commit and push the deployment records in CD mode.
    pub push_on_complete: bool,
}

/// What the cleanup did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Networks found in the infrastructure record.
    pub networks: usize,
    /// Ids of the testnets paused.
    pub paused: Vec<String>,
    /// Ids of the testnets that could not be paused.
    pub failed: Vec<String>,
    pub deployments_file: Option<PathBuf>,
    pub published: bool,
}

pub struct Cleanup<'a, P, W> {
    provider: &'a P,
    workspace: &'a W,
    store: &'a StateStore,
    config: CleanupConfig,
}

impl<'a, P: VnetProvider, W: Workspace> Cleanup<'a, P, W> {
    pub fn new(
        provider: &'a P,
        workspace: &'a W,
        store: &'a StateStore,
        config: CleanupConfig,
    ) -> Self {
        Self {
            provider,
            workspace,
            store,
            config,
        }
    }

    /// Run the cleanup. Never fails: every error is logged as a warning.
    pub async fn run(&self) -> CleanupReport {
        match self.try_run().await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!("Cleanup failed: {err}");
                CleanupReport::default()
            }
        }
    }

    async fn try_run(&self) -> Result<CleanupReport> {
        let Some(infra) = self.store.read_infra_for_current_job().await? else {
            tracing::warn!(
                job = %self.store.context().job_basename(),
                "No infrastructure information found to clean up"
            );
            return Ok(CleanupReport::default());
        };

        match self.workspace.scrub_sensitive_files().await {
            Ok(reverted) => {
                tracing::debug!(files = reverted.len(), "Sensitive configuration files checked");
            }
            Err(err) => tracing::warn!("Failed to revert sensitive configuration files: {err:#}"),
        }

        let infra = self.store.sanitize_persisted_infra(&infra).await?;

        let mut report = CleanupReport {
            networks: infra.networks.len(),
            ..Default::default()
        };

        match self.config.mode {
            Mode::Ci => self.pause_all(&infra.networks, &mut report).await,
            Mode::Cd => self.record_deployments(&infra.networks, &mut report).await?,
        }

        Ok(report)
    }

    async fn pause_all(&self, networks: &Networks, report: &mut CleanupReport) {
        let pauses = networks.values().map(|network| async move {
            let outcome = self
                .provider
                .pause_vnet(&network.id)
                .await
                .map_err(|err| VnetError::external(&network.network_id, err));
            (network, outcome)
        });

        for (network, outcome) in join_all(pauses).await {
            match outcome {
                Ok(()) => {
                    tracing::info!(
                        testnet_id = %network.id,
                        network_id = %network.network_id,
                        "Virtual TestNet paused"
                    );
                    report.paused.push(network.id.clone());
                }
                Err(err) => {
                    tracing::warn!(testnet_id = %network.id, "{err}");
                    report.failed.push(network.id.clone());
                }
            }
        }
    }

    async fn record_deployments(&self, networks: &Networks, report: &mut CleanupReport) -> Result<()> {
        tracing::info!("Running in CD mode, keeping Virtual TestNets running");

        let dir = self.store.build_output_dir();
        let groups = error::recover(parse_log_dir(&dir, networks).await)?.unwrap_or_default();

        let persisted = if groups.is_empty() {
            tracing::info!(path = %dir.display(), "No deployments found in build logs");
            true
        } else {
            let parsed = ParsedDeployments::new(self.store.context(), groups);
            report.deployments_file = self.store.store_parsed_deployments(&parsed).await?;
            report.deployments_file.is_some()
        };

        // The logs are the only copy of the deployments until the record is written.
        if !persisted {
            tracing::warn!(
                path = %dir.display(),
                "Deployments were not persisted, keeping build logs and skipping publish"
            );
            return Ok(());
        }

        // Raw logs can contain privileged endpoints and must never be committed.
        self.store.discard_build_output_dir().await?;

        if !self.config.push_on_complete {
            return Ok(());
        }

        let message = commit_message(&self.store.context().workflow, networks);
        match self.workspace.publish(&message).await {
            Ok(()) => report.published = true,
            Err(err) => tracing::warn!("Failed to publish deployment records: {err:#}"),
        }

        Ok(())
    }
}

/// Commit message listing the public endpoint of every network.
pub fn commit_message(workflow: &str, networks: &Networks) -> String {
    let links = networks
        .values()
        .map(|network| format!("{}: {}", network.chain_id, network.public_rpc_url))
        .collect::<Vec<_>>()
        .join("\n");

    format!("[skip actions] GitHub Action {workflow} Deployed contracts\n\n{links}")
}
