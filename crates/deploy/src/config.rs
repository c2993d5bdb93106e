//! Provisioning inputs, their sources and their validation.
//!
//! Inputs arrive as loosely typed values (action inputs, CLI flags, an optional
//! TOML file). [`ProvisionInputs::validate`] turns them into a [`ProvisionConfig`]
//! before any network call is attempted.

use std::path::Path;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use strum::VariantNames;

use crate::error::{Result, VnetError};

/// Pipeline mode the action runs in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Mode {
    /// Continuous integration: networks are paused at cleanup.
    #[default]
    Ci,
    /// Continuous deployment: networks keep running, deployments are recorded.
    Cd,
}

impl Mode {
    /// Parses an optional mode input, defaulting to [`Mode::Ci`] when blank.
    pub fn parse_input(input: Option<&str>) -> Result<Self> {
        match input.map(str::trim).filter(|mode| !mode.is_empty()) {
            None => Ok(Self::default()),
            Some(mode) => mode.parse().map_err(|_| {
                VnetError::configuration(format!("Input 'mode' must be one of: CI, CD (got '{mode}')"))
            }),
        }
    }
}

/// Who can see verified contract sources in the public explorer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerificationVisibility {
    #[default]
    Bytecode,
    Abi,
    Src,
}

/// A boolean input that may arrive either typed or as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoolInput {
    Bool(bool),
    Text(String),
}

impl From<bool> for BoolInput {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for BoolInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl BoolInput {
    /// Interprets the input, returning `None` for blank text.
    ///
    /// Accepts the same spellings as GitHub Actions boolean inputs.
    pub fn parse(&self, name: &str) -> Result<Option<bool>> {
        match self {
            Self::Bool(value) => Ok(Some(*value)),
            Self::Text(text) => match text.trim() {
                "" => Ok(None),
                "true" | "True" | "TRUE" => Ok(Some(true)),
                "false" | "False" | "FALSE" => Ok(Some(false)),
                other => Err(VnetError::configuration(format!(
                    "Input '{name}' must be a boolean (got '{other}')"
                ))),
            },
        }
    }
}

/// Raw provisioning inputs, merged from an optional TOML file and CLI/env values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testnet_name: Option<String>,
    /// Source networks to fork, one testnet each.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub network_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
    /// Digits prepended to each network id to form the testnet chain id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_sync: Option<BoolInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_explorer: Option<BoolInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// One testnet to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTarget {
    /// The network identifier as requested, used as key and env suffix.
    pub network_id: String,
    /// The source chain being forked.
    pub fork_network_id: u64,
    /// The chain id assigned to the virtual testnet.
    pub chain_id: u64,
}

/// Validated provisioning configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub access_key: String,
    pub account_name: String,
    pub project_name: String,
    pub testnet_name: String,
    pub block_number: String,
    pub targets: Vec<NetworkTarget>,
    pub state_sync: bool,
    pub public_explorer: bool,
    pub verification_visibility: VerificationVisibility,
    pub mode: Mode,
}

impl ProvisionInputs {
    /// Load inputs from an optional TOML file, with `overrides` taking precedence.
    pub fn load(config_file: Option<&Path>, overrides: ProvisionInputs) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(VnetError::configuration(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|err| VnetError::configuration(err.to_string()))
    }

    /// Check every required input and derive the per-network targets.
    pub fn validate(self) -> Result<ProvisionConfig> {
        let access_key = required("access_key", self.access_key)?;
        let project_name = required("project_name", self.project_name)?;
        let account_name = required("account_name", self.account_name)?;
        let testnet_name = required("testnet_name", self.testnet_name)?;
        let block_number = required("block_number", self.block_number)?;

        let chain_id_prefix = self
            .chain_id_prefix
            .map(|prefix| prefix.trim().to_string())
            .unwrap_or_default();
        if !chain_id_prefix.chars().all(|c| c.is_ascii_digit()) {
            return Err(VnetError::configuration(format!(
                "Input 'chain_id_prefix' must be a valid number (got '{chain_id_prefix}')"
            )));
        }

        let targets = self
            .network_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(|network_id| network_target(network_id, &chain_id_prefix))
            .collect::<Result<Vec<_>>>()?;
        if targets.is_empty() {
            return Err(VnetError::configuration("Input 'network_id' is required"));
        }

        let state_sync = parse_flag("state_sync", self.state_sync.as_ref())?;
        let public_explorer = parse_flag("public_explorer", self.public_explorer.as_ref())?;

        let visibility = match self
            .verification_visibility
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            None => VerificationVisibility::default(),
            Some(value) => value.parse().map_err(|_| {
                VnetError::configuration(format!(
                    "Input 'verification_visibility' must be one of: {} (got '{value}')",
                    VerificationVisibility::VARIANTS.join(", ")
                ))
            })?,
        };

        // Sources can only be shown through the public explorer.
        let verification_visibility = if public_explorer {
            visibility
        } else {
            VerificationVisibility::Bytecode
        };

        let mode = Mode::parse_input(self.mode.as_deref())?;

        tracing::debug!(
            networks = targets.len(),
            %mode,
            %verification_visibility,
            "Input validation passed"
        );

        Ok(ProvisionConfig {
            access_key,
            account_name,
            project_name,
            testnet_name,
            block_number,
            targets,
            state_sync,
            public_explorer,
            verification_visibility,
            mode,
        })
    }
}

fn required(name: &str, value: Option<String>) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| VnetError::configuration(format!("Input '{name}' is required")))
}

fn parse_flag(name: &str, value: Option<&BoolInput>) -> Result<bool> {
    match value {
        Some(input) => Ok(input.parse(name)?.unwrap_or(false)),
        None => Ok(false),
    }
}

fn network_target(network_id: &str, chain_id_prefix: &str) -> Result<NetworkTarget> {
    let fork_network_id = network_id.parse().map_err(|_| {
        VnetError::configuration(format!(
            "Input 'network_id' must be a valid number (got '{network_id}')"
        ))
    })?;

    let chain_id = format!("{chain_id_prefix}{network_id}").parse().map_err(|_| {
        VnetError::configuration(format!(
            "Chain id '{chain_id_prefix}{network_id}' does not fit in 64 bits"
        ))
    })?;

    Ok(NetworkTarget {
        network_id: network_id.to_string(),
        fork_network_id,
        chain_id,
    })
}
