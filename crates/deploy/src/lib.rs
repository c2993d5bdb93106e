//! vnet-deploy - Virtual testnet orchestration for CI/CD pipelines.
//!
//! This crate provisions one Tenderly Virtual TestNet per requested network,
//! hands the connection details to later pipeline steps, and at the end of the
//! job either pauses the testnets (CI) or turns the build logs into deployment
//! records (CD).

mod api;
mod config;
mod context;
mod deployment_logs;
mod deployments;
mod env;
mod error;
mod fs;
mod lifecycle;
mod network;
mod provider;
mod provision;
mod store;
mod tenderly;
mod workspace;

#[cfg(test)]
mod testing;

pub use config::{
    BoolInput, Mode, NetworkTarget, ProvisionConfig, ProvisionInputs, VerificationVisibility,
};
pub use context::RunContext;
pub use deployment_logs::{group_by_network, parse_contracts, parse_deployment_logs, parse_log_dir};
pub use deployments::{Contract, DeploymentGroup, ParsedDeployments, WorkflowInfo};
pub use env::EnvExporter;
pub use error::{Result, Severity, VnetError, recover};
pub use fs::FsHandler;
pub use lifecycle::{Cleanup, CleanupConfig, CleanupReport, commit_message};
pub use network::{GithubContext, InfrastructureInfo, NetworkInfo, Networks};
pub use provider::{CreateVnetRequest, CreatedVnet, VnetProvider};
pub use provision::{ProvisionReport, Provisioner};
pub use store::{STATE_DIR, StateStore};
pub use tenderly::{API_BASE_URL, DASHBOARD_URL, TenderlyClient};
pub use workspace::{GitRemote, GitWorkspace, SENSITIVE_FILES, Workspace};

/// Names of the variables exported to later steps.
pub mod vars {
    pub use crate::provision::{
        ACCESS_KEY, ACCOUNT_NAME, ADMIN_RPC_URL, BUILD_OUTPUT_FILE, BUILD_SLUG, CHAIN_ID,
        FOUNDRY_VERIFICATION_URL, PROJECT_NAME, PUBLIC_RPC_URL, TESTNET_ID, TESTNET_SLUG,
    };
}
