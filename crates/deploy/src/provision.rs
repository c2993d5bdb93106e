//! Concurrent provisioning of one virtual testnet per requested network.

use std::{collections::BTreeMap, path::PathBuf};

use futures::future::join_all;

use crate::{
    EnvExporter, Mode, NetworkInfo, NetworkTarget, Networks, ProvisionConfig, StateStore,
    error::{self, Result, VnetError},
    provider::{CreateVnetRequest, VnetProvider},
};

pub const BUILD_SLUG: &str = "BUILD_SLUG";
pub const ACCOUNT_NAME: &str = "TENDERLY_ACCOUNT_NAME";
pub const PROJECT_NAME: &str = "TENDERLY_PROJECT_NAME";
pub const ACCESS_KEY: &str = "TENDERLY_ACCESS_KEY";

pub const TESTNET_ID: &str = "TENDERLY_TESTNET_ID";
pub const ADMIN_RPC_URL: &str = "TENDERLY_ADMIN_RPC_URL";
pub const PUBLIC_RPC_URL: &str = "TENDERLY_PUBLIC_RPC_URL";
pub const TESTNET_SLUG: &str = "TENDERLY_TESTNET_SLUG";
pub const CHAIN_ID: &str = "TENDERLY_CHAIN_ID";
pub const FOUNDRY_VERIFICATION_URL: &str = "TENDERLY_FOUNDRY_VERIFICATION_URL";
pub const BUILD_OUTPUT_FILE: &str = "BUILD_OUTPUT_FILE";

/// Path appended to the admin RPC URL for Etherscan-style verification.
const VERIFICATION_PATH: &str = "/verify/etherscan";

/// Outcome of a provisioning run.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    /// Networks that were created, keyed by network identifier.
    pub networks: Networks,
    /// Error message of every network that could not be created.
    pub failures: BTreeMap<String, String>,
    /// Where the infrastructure record was written, if it was.
    pub infra_file: Option<PathBuf>,
}

/// Creates the testnets described by a [`ProvisionConfig`].
pub struct Provisioner<'a, P> {
    provider: &'a P,
    config: &'a ProvisionConfig,
    store: &'a StateStore,
    env: &'a EnvExporter,
}

impl<'a, P: VnetProvider> Provisioner<'a, P> {
    pub fn new(
        provider: &'a P,
        config: &'a ProvisionConfig,
        store: &'a StateStore,
        env: &'a EnvExporter,
    ) -> Self {
        Self {
            provider,
            config,
            store,
            env,
        }
    }

    /// Provision every target concurrently and persist whatever succeeded.
    ///
    /// A failing network never cancels the others and never fails the run.
    pub async fn provision(&self) -> Result<ProvisionReport> {
        self.export_run_variables()?;

        let targets = &self.config.targets;
        tracing::info!(networks = targets.len(), mode = %self.config.mode, "Provisioning Virtual TestNets");

        // Re-runs keep the run id, so the API slug also carries the attempt time.
        let attempt = chrono::Utc::now().timestamp();
        let outcomes = join_all(
            targets
                .iter()
                .map(|target| self.provision_network(target, attempt)),
        )
        .await;

        let mut report = ProvisionReport::default();
        for (target, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(network) => {
                    report.networks.insert(target.network_id.clone(), network);
                }
                Err(err) => {
                    tracing::warn!(network_id = %target.network_id, "{err}");
                    report
                        .failures
                        .insert(target.network_id.clone(), err.to_string());
                }
            }
        }

        if self.config.mode == Mode::Cd {
            self.store.ensure_build_output_dir().await?;
        }

        report.infra_file = self.store.store_infrastructure_info(&report.networks).await?;

        tracing::info!(
            provisioned = report.networks.len(),
            failed = report.failures.len(),
            "Provisioning finished"
        );
        Ok(report)
    }

    fn export_run_variables(&self) -> Result<()> {
        let build_slug = self.store.context().build_slug();
        error::recover(self.env.export(BUILD_SLUG, &build_slug))?;
        error::recover(self.env.export(ACCOUNT_NAME, &self.config.account_name))?;
        error::recover(self.env.export(PROJECT_NAME, &self.config.project_name))?;
        error::recover(self.env.export_secret(ACCESS_KEY, &self.config.access_key))?;
        Ok(())
    }

    async fn provision_network(&self, target: &NetworkTarget, attempt: i64) -> Result<NetworkInfo> {
        let slug = self
            .store
            .context()
            .testnet_slug(&self.config.testnet_name, &target.network_id);

        let request = CreateVnetRequest {
            slug: format!("{slug}-{attempt}"),
            display_name: slug.clone(),
            network_id: target.fork_network_id,
            block_number: self.config.block_number.clone(),
            chain_id: target.chain_id,
            state_sync: self.config.state_sync,
            public_explorer: self.config.public_explorer,
            verification_visibility: self.config.verification_visibility,
        };

        let created = self
            .provider
            .create_vnet(&request)
            .await
            .map_err(|err| VnetError::external(&target.network_id, err))?;

        let explorer_url = if self.config.public_explorer {
            self.provider.explorer_url(&created.id)
        } else {
            None
        };

        let network = NetworkInfo {
            id: created.id,
            network_id: target.network_id.clone(),
            chain_id: target.chain_id,
            testnet_slug: slug,
            admin_rpc_url: Some(created.admin_rpc_url),
            public_rpc_url: created.public_rpc_url,
            explorer_url,
        };

        self.export_network(&network)?;

        tracing::info!(
            network_id = %network.network_id,
            testnet_id = %network.id,
            chain_id = network.chain_id,
            "Virtual TestNet created"
        );
        Ok(network)
    }

    fn export_network(&self, network: &NetworkInfo) -> Result<()> {
        let network_id = network.network_id.as_str();
        let admin_rpc_url = network.admin_rpc_url.as_deref().unwrap_or_default();

        let secrets = [
            (ADMIN_RPC_URL, admin_rpc_url.to_string()),
            (
                FOUNDRY_VERIFICATION_URL,
                format!("{admin_rpc_url}{VERIFICATION_PATH}"),
            ),
        ];
        for (key, value) in secrets {
            error::recover(self.env.export_secret_for_network(key, &value, network_id))?;
        }

        let build_output_file = self.store.build_output_file(&network.testnet_slug);
        let variables = [
            (TESTNET_ID, network.id.clone()),
            (PUBLIC_RPC_URL, network.public_rpc_url.clone()),
            (TESTNET_SLUG, network.testnet_slug.clone()),
            (CHAIN_ID, network.chain_id.to_string()),
            (BUILD_OUTPUT_FILE, build_output_file.display().to_string()),
        ];
        for (key, value) in variables {
            error::recover(self.env.export_for_network(key, &value, network_id))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ProvisionInputs, VerificationVisibility,
        testing::{FakeProvider, run_context},
    };
    use tempdir::TempDir;

    fn config(network_ids: &[&str]) -> ProvisionConfig {
        ProvisionInputs {
            access_key: Some("secret-key".to_string()),
            account_name: Some("acme".to_string()),
            project_name: Some("contracts".to_string()),
            testnet_name: Some("CI".to_string()),
            network_ids: network_ids.iter().map(|id| id.to_string()).collect(),
            block_number: Some("latest".to_string()),
            chain_id_prefix: Some("7357".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn test_provision_exports_and_persists() {
        let temp_dir = TempDir::new("vnet-provision").unwrap();
        let store = StateStore::new(run_context(temp_dir.path()));
        let env = EnvExporter::in_memory();
        let provider = FakeProvider::default();
        let config = config(&["1", "137"]);

        let report = Provisioner::new(&provider, &config, &store, &env)
            .provision()
            .await
            .unwrap();

        assert_eq!(report.networks.len(), 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.networks["137"].chain_id, 7357137);
        assert_eq!(report.networks["137"].explorer_url, None);

        let slug = "42-ci-net-137-deploy-contracts-test-1001";
        assert_eq!(report.networks["137"].testnet_slug, slug);
        assert_eq!(env.get("BUILD_SLUG").as_deref(), Some("42-1001"));
        assert_eq!(env.get("TENDERLY_ACCOUNT_NAME").as_deref(), Some("acme"));
        assert!(env.is_masked("TENDERLY_ACCESS_KEY"));
        assert_eq!(env.get("TENDERLY_TESTNET_ID_137").as_deref(), Some("vnet-137"));
        assert_eq!(env.get("TENDERLY_CHAIN_ID_137").as_deref(), Some("7357137"));
        assert_eq!(env.get("TENDERLY_TESTNET_SLUG_137").as_deref(), Some(slug));
        assert!(env.is_masked("TENDERLY_ADMIN_RPC_URL_137"));
        assert_eq!(
            env.get("TENDERLY_FOUNDRY_VERIFICATION_URL_137").as_deref(),
            Some("https://virtual.rpc.example/admin/137/verify/etherscan")
        );
        assert_eq!(
            env.get("BUILD_OUTPUT_FILE_137").map(PathBuf::from),
            Some(temp_dir.path().join(format!(".tenderly/tmp/{slug}.json")))
        );

        let requests = provider.created.lock().unwrap().clone();
        let request = requests.iter().find(|r| r.network_id == 137).unwrap();
        assert_eq!(request.display_name, slug);
        assert!(request.slug.starts_with(&format!("{slug}-")));
        assert_eq!(request.block_number, "latest");
        assert_eq!(request.verification_visibility, VerificationVisibility::Bytecode);

        let infra = store.read_infra_for_current_job().await.unwrap().unwrap();
        assert_eq!(infra.networks, report.networks.sanitized());
        let content = std::fs::read_to_string(report.infra_file.unwrap()).unwrap();
        assert!(!content.contains("/admin/"));
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let temp_dir = TempDir::new("vnet-provision").unwrap();
        let store = StateStore::new(run_context(temp_dir.path()));
        let env = EnvExporter::in_memory();
        let provider = FakeProvider::failing_creates(&[2]);
        let config = config(&["1", "2", "3"]);

        let report = Provisioner::new(&provider, &config, &store, &env)
            .provision()
            .await
            .unwrap();

        assert_eq!(report.networks.keys().collect::<Vec<_>>(), vec!["1", "3"]);
        assert!(report.failures["2"].contains("not supported"));
        assert!(env.get("TENDERLY_TESTNET_ID_1").is_some());
        assert!(env.get("TENDERLY_TESTNET_ID_3").is_some());
        assert!(env.snapshot().keys().all(|key| !key.ends_with("_2")));

        let infra = store.read_infra_for_current_job().await.unwrap().unwrap();
        assert_eq!(infra.networks.keys().collect::<Vec<_>>(), vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_all_failures_still_succeed() {
        let temp_dir = TempDir::new("vnet-provision").unwrap();
        let store = StateStore::new(run_context(temp_dir.path()));
        let env = EnvExporter::in_memory();
        let provider = FakeProvider::failing_creates(&[1]);
        let config = config(&["1"]);

        let report = Provisioner::new(&provider, &config, &store, &env)
            .provision()
            .await
            .unwrap();

        assert!(report.networks.is_empty());
        assert_eq!(report.failures.len(), 1);
        let infra = store.read_infra_for_current_job().await.unwrap().unwrap();
        assert!(infra.networks.is_empty());
    }

    #[tokio::test]
    async fn test_cd_mode_prepares_build_output_and_explorer() {
        let temp_dir = TempDir::new("vnet-provision").unwrap();
        let store = StateStore::new(run_context(temp_dir.path()));
        let env = EnvExporter::in_memory();
        let provider = FakeProvider::default();
        let mut config = config(&["10"]);
        config.mode = Mode::Cd;
        config.public_explorer = true;

        let report = Provisioner::new(&provider, &config, &store, &env)
            .provision()
            .await
            .unwrap();

        assert!(store.build_output_dir().is_dir());
        assert_eq!(
            report.networks["10"].explorer_url.as_deref(),
            Some("https://dashboard.example/testnet/vnet-10")
        );
    }

    #[tokio::test]
    async fn test_rerun_sends_a_fresh_api_slug() {
        let temp_dir = TempDir::new("vnet-provision").unwrap();
        let store = StateStore::new(run_context(temp_dir.path()));
        let env = EnvExporter::in_memory();
        let provider = FakeProvider::default();
        let config = config(&["1"]);
        let provisioner = Provisioner::new(&provider, &config, &store, &env);

        let first = provisioner.provision().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let second = provisioner.provision().await.unwrap();

        let requests = provider.created.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0].slug, requests[1].slug);
        assert_eq!(requests[0].display_name, requests[1].display_name);
        assert_eq!(
            first.networks["1"].testnet_slug,
            second.networks["1"].testnet_slug
        );
    }
}
