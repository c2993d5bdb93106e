//! Tenderly Virtual TestNet REST client.

use anyhow::Context;
use reqwest::{Method, header};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::{
    api,
    provider::{CreateVnetRequest, CreatedVnet, VnetProvider},
};

/// Base URL of the Tenderly REST API.
pub const API_BASE_URL: &str = "https://api.tenderly.co/api/v1";

/// Base URL of the Tenderly dashboard.
pub const DASHBOARD_URL: &str = "https://dashboard.tenderly.co";

const ADMIN_RPC: &str = "Admin RPC";
const PUBLIC_RPC: &str = "Public RPC";

#[derive(Debug, Deserialize)]
struct VnetResponse {
    id: String,
    #[serde(default)]
    rpcs: Vec<RpcEndpoint>,
}

#[derive(Debug, Deserialize)]
struct RpcEndpoint {
    name: String,
    url: String,
}

/// Client for the virtual testnets of one Tenderly project.
#[derive(Debug, Clone)]
pub struct TenderlyClient {
    client: reqwest::Client,
    base_url: Url,
    account_name: String,
    project_name: String,
    access_key: String,
}

impl TenderlyClient {
    pub fn new(
        account_name: impl Into<String>,
        project_name: impl Into<String>,
        access_key: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Self::with_base_url(API_BASE_URL, account_name, project_name, access_key)
    }

    /// Client targeting another deployment of the API.
    pub fn with_base_url(
        base_url: &str,
        account_name: impl Into<String>,
        project_name: impl Into<String>,
        access_key: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API URL: {base_url}"))?;

        Ok(Self {
            client: api::create_client()?,
            base_url,
            account_name: account_name.into(),
            project_name: project_name.into(),
            access_key: access_key.into(),
        })
    }

    fn vnets_url(&self) -> String {
        format!(
            "{}/account/{}/project/{}/vnets",
            self.base_url.as_str().trim_end_matches('/'),
            self.account_name,
            self.project_name
        )
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(header::ACCEPT, "application/json")
            .header("X-Access-Key", &self.access_key)
    }
}

impl VnetProvider for TenderlyClient {
    async fn create_vnet(&self, request: &CreateVnetRequest) -> anyhow::Result<CreatedVnet> {
        tracing::debug!(
            slug = %request.slug,
            network_id = request.network_id,
            chain_id = request.chain_id,
            "Creating Virtual TestNet"
        );

        let body = serde_json::json!({
            "slug": request.slug,
            "display_name": request.display_name,
            "fork_config": {
                "network_id": request.network_id,
                "block_number": request.block_number,
            },
            "virtual_network_config": {
                "chain_config": { "chain_id": request.chain_id },
            },
            "sync_state_config": { "enabled": request.state_sync },
            "explorer_page_config": {
                "enabled": request.public_explorer,
                "verification_visibility": request.verification_visibility,
            },
        });

        let response: VnetResponse = api::send_json(
            self.request(Method::POST, self.vnets_url()).json(&body),
            "Failed to create TestNet",
        )
        .await?;

        let endpoint = |name: &str| {
            response
                .rpcs
                .iter()
                .find(|rpc| rpc.name == name)
                .map(|rpc| rpc.url.clone())
        };
        let (Some(admin_rpc_url), Some(public_rpc_url)) = (endpoint(ADMIN_RPC), endpoint(PUBLIC_RPC))
        else {
            let names: Vec<&str> = response.rpcs.iter().map(|rpc| rpc.name.as_str()).collect();
            anyhow::bail!("Missing RPC endpoints in response (got {names:?})");
        };

        Ok(CreatedVnet {
            id: response.id,
            admin_rpc_url,
            public_rpc_url,
        })
    }

    async fn pause_vnet(&self, id: &str) -> anyhow::Result<()> {
        if id.is_empty() {
            anyhow::bail!("TestNet ID is required to stop a TestNet");
        }

        let url = format!("{}/{id}", self.vnets_url());
        let _: Value = api::send_json(
            self.request(Method::PATCH, url)
                .json(&serde_json::json!({ "status": "stopped" })),
            "Failed to stop TestNet",
        )
        .await?;

        tracing::debug!(testnet_id = %id, "TestNet stopped");
        Ok(())
    }

    fn explorer_url(&self, id: &str) -> Option<String> {
        Some(format!(
            "{DASHBOARD_URL}/{}/{}/testnet/{id}",
            self.account_name, self.project_name
        ))
    }
}
