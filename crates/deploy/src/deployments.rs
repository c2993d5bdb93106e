//! Structured deployment records reconciled from build logs.

use serde::{Deserialize, Serialize};

use crate::{NetworkInfo, RunContext};

/// A contract deployed, and possibly verified, on a virtual testnet.
///
/// Fields the logs never mention stay `None` and serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub address: Option<String>,
    /// Chain id as printed in the logs.
    pub chain: Option<String>,
    pub verification_status: Option<String>,
    pub compiler: Option<String>,
    pub optimizations: Option<u64>,
    pub contract_path: Option<String>,
    pub contract_name: Option<String>,
}

impl Contract {
    /// Whether no field has been set yet.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Contracts attributed to one virtual testnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentGroup {
    pub virtual_test_net: NetworkInfo,
    pub contracts: Vec<Contract>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInfo {
    pub run_number: u64,
    pub workflow: String,
    pub job: String,
    pub run_id: u64,
}

impl From<&RunContext> for WorkflowInfo {
    fn from(ctx: &RunContext) -> Self {
        Self {
            run_number: ctx.run_number,
            workflow: ctx.workflow.clone(),
            job: ctx.job.clone(),
            run_id: ctx.run_id,
        }
    }
}

/// Everything deployed by one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDeployments {
    pub workflow: WorkflowInfo,
    pub deployments: Vec<DeploymentGroup>,
}

impl ParsedDeployments {
    pub fn new(ctx: &RunContext, deployments: Vec<DeploymentGroup>) -> Self {
        Self {
            workflow: ctx.into(),
            deployments,
        }
    }
}
