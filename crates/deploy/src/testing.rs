//! Fixtures and in-memory fakes shared by the unit tests.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    NetworkInfo, RunContext,
    provider::{CreateVnetRequest, CreatedVnet, VnetProvider},
    workspace::Workspace,
};

pub(crate) fn network(network_id: &str, chain_id: u64) -> NetworkInfo {
    NetworkInfo {
        id: format!("vnet-{network_id}"),
        network_id: network_id.to_string(),
        chain_id,
        testnet_slug: format!("42-ci-net-{network_id}-deploy-contracts-test-1001"),
        admin_rpc_url: Some(format!("https://virtual.rpc.example/admin/{network_id}")),
        public_rpc_url: format!("https://virtual.rpc.example/public/{network_id}"),
        explorer_url: None,
    }
}

pub(crate) fn run_context(root: &Path) -> RunContext {
    RunContext {
        run_id: 1001,
        run_number: 42,
        workflow: "Deploy Contracts".to_string(),
        job: "test".to_string(),
        workspace: root.to_path_buf(),
    }
}

/// Provider answering from memory.
#[derive(Debug, Default)]
pub(crate) struct FakeProvider {
    failing_creates: BTreeSet<u64>,
    failing_pauses: BTreeSet<String>,
    pub created: Mutex<Vec<CreateVnetRequest>>,
    paused_ids: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn failing_creates(network_ids: &[u64]) -> Self {
        Self {
            failing_creates: network_ids.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn failing_pauses(testnet_ids: &[&str]) -> Self {
        Self {
            failing_pauses: testnet_ids.iter().map(|id| id.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn paused(&self) -> Vec<String> {
        let mut paused = self.paused_ids.lock().unwrap().clone();
        paused.sort();
        paused
    }
}

impl VnetProvider for FakeProvider {
    async fn create_vnet(&self, request: &CreateVnetRequest) -> anyhow::Result<CreatedVnet> {
        self.created.lock().unwrap().push(request.clone());

        if self.failing_creates.contains(&request.network_id) {
            anyhow::bail!("Failed to create TestNet: network {} is not supported", request.network_id);
        }

        Ok(CreatedVnet {
            id: format!("vnet-{}", request.network_id),
            admin_rpc_url: format!("https://virtual.rpc.example/admin/{}", request.network_id),
            public_rpc_url: format!("https://virtual.rpc.example/public/{}", request.network_id),
        })
    }

    async fn pause_vnet(&self, id: &str) -> anyhow::Result<()> {
        if self.failing_pauses.contains(id) {
            anyhow::bail!("Failed to stop TestNet: {id} not found");
        }
        self.paused_ids.lock().unwrap().push(id.to_string());
        Ok(())
    }

    fn explorer_url(&self, id: &str) -> Option<String> {
        Some(format!("https://dashboard.example/testnet/{id}"))
    }
}

/// Workspace recording what it was asked to do.
#[derive(Debug, Default)]
pub(crate) struct RecordingWorkspace {
    fail_scrub: bool,
    pub scrubbed: Mutex<usize>,
    published_messages: Mutex<Vec<String>>,
}

impl RecordingWorkspace {
    pub fn failing_scrub() -> Self {
        Self {
            fail_scrub: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<String> {
        self.published_messages.lock().unwrap().clone()
    }
}

impl Workspace for RecordingWorkspace {
    async fn scrub_sensitive_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        *self.scrubbed.lock().unwrap() += 1;
        if self.fail_scrub {
            anyhow::bail!("not a git repository");
        }
        Ok(Vec::new())
    }

    async fn publish(&self, message: &str) -> anyhow::Result<()> {
        self.published_messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
