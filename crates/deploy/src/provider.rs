//! Provisioning provider abstraction.

use std::future::Future;

use anyhow::Result;

use crate::VerificationVisibility;

/// Everything needed to create one virtual testnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVnetRequest {
    /// Unique slug of the testnet.
    pub slug: String,
    pub display_name: String,
    /// The source chain being forked.
    pub network_id: u64,
    /// Block to fork from, a number or a tag such as `latest`.
    pub block_number: String,
    /// Chain id assigned to the testnet.
    pub chain_id: u64,
    pub state_sync: bool,
    pub public_explorer: bool,
    pub verification_visibility: VerificationVisibility,
}

/// A testnet as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedVnet {
    pub id: String,
    pub admin_rpc_url: String,
    pub public_rpc_url: String,
}

/// A service able to create and pause virtual testnets.
///
/// Implementations report failures as plain errors; callers attach the network
/// they were working on.
pub trait VnetProvider: Send + Sync {
    /// Create a testnet forking `request.network_id`.
    fn create_vnet(
        &self,
        request: &CreateVnetRequest,
    ) -> impl Future<Output = Result<CreatedVnet>> + Send;

    /// Stop block production on the testnet `id`, keeping its data.
    fn pause_vnet(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Dashboard page of the testnet `id`, if the provider has one.
    fn explorer_url(&self, _id: &str) -> Option<String> {
        None
    }
}
