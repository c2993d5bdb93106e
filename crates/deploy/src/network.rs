//! Provisioned network records and the job-scoped infrastructure envelope.

use std::collections::BTreeMap;

use derive_more::{Deref, DerefMut, From};
use serde::{Deserialize, Serialize};

use crate::RunContext;

/// One provisioned virtual testnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    /// Provider-assigned testnet id.
    pub id: String,
    /// The source network being forked.
    pub network_id: String,
    /// The chain id assigned to the testnet.
    pub chain_id: u64,
    pub testnet_slug: String,
    /// Privileged endpoint. Absent once the record has been sanitized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_rpc_url: Option<String>,
    pub public_rpc_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

impl NetworkInfo {
    /// A copy without the admin RPC URL.
    pub fn sanitized(&self) -> Self {
        Self {
            admin_rpc_url: None,
            ..self.clone()
        }
    }
}

/// Provisioned networks keyed by the requested network identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref, DerefMut, From)]
#[serde(transparent)]
pub struct Networks(BTreeMap<String, NetworkInfo>);

impl Networks {
    /// A copy with every admin RPC URL removed.
    pub fn sanitized(&self) -> Self {
        self.iter()
            .map(|(key, network)| (key.clone(), network.sanitized()))
            .collect()
    }

    pub fn is_sanitized(&self) -> bool {
        self.values().all(|network| network.admin_rpc_url.is_none())
    }
}

impl FromIterator<(String, NetworkInfo)> for Networks {
    fn from_iter<I: IntoIterator<Item = (String, NetworkInfo)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Run metadata stored alongside the networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubContext {
    pub workflow: String,
    pub run_id: String,
    pub run_number: String,
    pub job: String,
}

impl From<&RunContext> for GithubContext {
    fn from(ctx: &RunContext) -> Self {
        Self {
            workflow: ctx.workflow.clone(),
            run_id: ctx.run_id.to_string(),
            run_number: ctx.run_number.to_string(),
            job: ctx.job.clone(),
        }
    }
}

/// Infrastructure provisioned by one pipeline job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureInfo {
    pub networks: Networks,
    /// RFC 3339 creation time.
    pub timestamp: String,
    pub github_context: GithubContext,
}

impl InfrastructureInfo {
    /// Wrap `networks` for the job identified by `ctx`, stamped with the current time.
    pub fn new(networks: Networks, ctx: &RunContext) -> Self {
        Self {
            networks,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            github_context: ctx.into(),
        }
    }

    pub fn sanitized(&self) -> Self {
        Self {
            networks: self.networks.sanitized(),
            ..self.clone()
        }
    }
}
